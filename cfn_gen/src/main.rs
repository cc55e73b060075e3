use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Serialize, Deserialize)]
struct Parameters {
    stack_name: String,
    code_bucket: String,
    table_name: String,
    log_retention_in_days: u16,
}

#[derive(Debug, Serialize, Deserialize)]
struct Route {
    method: String,
    path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Instance {
    name: String,
    #[serde(default)]
    environment: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    display_name: String,
    path: String,
    architectures: Vec<String>,
    #[serde(default)]
    table_access: bool,
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    instances: Vec<Instance>,
}

fn main() -> Result<()> {
    let parameters = load_parameters()?;
    let manifests = load_manifests()?;
    let cfn = build_cloudformation(&parameters, &manifests)?;
    create_template_file("template.yml", &cfn)?;

    Ok(())
}

fn load_parameters() -> Result<Parameters> {
    let parameters = fs::read_to_string("parameters.yml")?;
    let parameters: Parameters = serde_yaml::from_str(&parameters)?;

    Ok(parameters)
}

fn load_manifests() -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for entry in WalkDir::new(".")
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == "manifest.yml")
    {
        manifests.push(load_manifest(entry.path())?);
    }

    if manifests.is_empty() {
        bail!("no manifest.yml found next to any function crate");
    }

    Ok(manifests)
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let manifest = fs::read_to_string(path)?;
    let manifest: Manifest = serde_yaml::from_str(&manifest)?;

    Ok(manifest)
}

fn pascal_case(name: &str) -> String {
    name.split(['-', '_', '.', ',', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn lambda_name(instance: &Instance, architecture: &str) -> String {
    format!(
        "Lambda{}{}",
        pascal_case(&instance.name),
        architecture.replace('_', "").to_uppercase()
    )
}

fn function_name(instance: &Instance, manifest: &Manifest, architecture: &str) -> String {
    if manifest.architectures.len() > 1 {
        format!("{}-{}", instance.name, architecture.replace('_', "-"))
    } else {
        instance.name.clone()
    }
}

fn build_cloudformation(parameters: &Parameters, manifests: &[Manifest]) -> Result<String> {
    let mut builder = String::new();

    // Setup the template
    builder.push_str(&format!(
        r#"---
AWSTemplateFormatVersion: 2010-09-09
Transform: AWS::Serverless-2016-10-31
Description: {}
Globals:
  Function:
    Timeout: 10
    MemorySize: 128
    Runtime: provided.al2
    Handler: bootstrap
    CodeUri:
      Bucket: {}"#,
        &parameters.stack_name, &parameters.code_bucket
    ));

    builder.push_str(
        "
Resources:",
    );

    // Table
    builder.push_str(&format!(
        r#"
  TableProducts:
    Type: AWS::DynamoDB::Table
    Properties:
      TableName: {}
      BillingMode: PAY_PER_REQUEST
      AttributeDefinitions:
        - AttributeName: productId
          AttributeType: S
      KeySchema:
        - AttributeName: productId
          KeyType: HASH"#,
        &parameters.table_name
    ));

    for manifest in manifests.iter() {
        let role_name = format!("Role{}", pascal_case(&manifest.path));

        // IAM Role
        builder.push_str(&format!(
            r#"
  {}:
    Type: AWS::IAM::Role
    Properties:
      RoleName: !Sub "iam-${{AWS::Region}}-{}-role"
      Path: /
      AssumeRolePolicyDocument:
        Version: 2012-10-17
        Statement:
          - Effect: Allow
            Principal:
              Service: lambda.amazonaws.com
            Action: sts:AssumeRole
      ManagedPolicyArns:
        - arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"#,
            role_name,
            manifest.path.replace('_', "-")
        ));

        if manifest.table_access {
            builder.push_str(&format!(
                r#"
      Policies:
        - PolicyName: !Sub "iam-${{AWS::Region}}-{}-table-policy"
          PolicyDocument:
            Version: 2012-10-17
            Statement:
              - Effect: Allow
                Action:
                  - dynamodb:GetItem
                  - dynamodb:Scan
                  - dynamodb:PutItem
                  - dynamodb:UpdateItem
                  - dynamodb:DeleteItem
                Resource: !GetAtt TableProducts.Arn"#,
                manifest.path.replace('_', "-")
            ));
        }

        // Lambda functions
        for instance in manifest.instances.iter() {
            for architecture in &manifest.architectures {
                let lambda_name = lambda_name(instance, architecture);
                let function_name = function_name(instance, manifest, architecture);

                builder.push_str(&format!(
                    r#"
  {}:
    Type: AWS::Serverless::Function
    Properties:
      FunctionName: {}
      Description: {} | {}
      Architectures: [{}]
      Role: !GetAtt {}.Arn
      CodeUri:
        Key: functions/{}_{}.zip"#,
                    lambda_name,
                    function_name,
                    &manifest.display_name,
                    architecture,
                    architecture,
                    role_name,
                    &manifest.path,
                    architecture
                ));

                let mut environment = manifest.environment.clone();
                environment.extend(instance.environment.clone());
                if manifest.table_access {
                    environment.insert("TABLE_NAME".to_string(), parameters.table_name.clone());
                }
                if !environment.is_empty() {
                    builder.push_str(
                        r#"
      Environment:
        Variables:"#,
                    );
                    for (name, value) in environment.iter() {
                        builder.push_str(&format!(
                            r#"
          {}: {}"#,
                            name,
                            quote(value)
                        ));
                    }
                }

                if !manifest.routes.is_empty() {
                    builder.push_str(
                        r#"
      Events:"#,
                    );
                    for route in manifest.routes.iter() {
                        builder.push_str(&format!(
                            r#"
        {}{}:
          Type: Api
          Properties:
            Path: {}
            Method: {}"#,
                            pascal_case(&route.method.to_lowercase()),
                            pascal_case(route.path.trim_start_matches('/')),
                            &route.path,
                            route.method.to_lowercase()
                        ));
                    }
                }

                builder.push_str(&format!(
                    r#"
  Logs{}:
    Type: AWS::Logs::LogGroup
    Properties:
      LogGroupName: /aws/lambda/{}
      RetentionInDays: {}"#,
                    lambda_name, function_name, &parameters.log_retention_in_days
                ));
            }
        }
    }

    if manifests.iter().any(|m| !m.routes.is_empty()) {
        builder.push_str(
            r#"
Outputs:
  ApiUrl:
    Value: !Sub "https://${ServerlessRestApi}.execute-api.${AWS::Region}.amazonaws.com/Prod""#,
        );
    }

    builder.push('\n');

    Ok(builder)
}

fn create_template_file(path: &str, content: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
