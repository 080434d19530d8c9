//! Docker Compose template conversion

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::errors::RuntimeError;
use crate::models::service::{PortMapping, ServiceSpec};

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Deserialize)]
struct ComposeService {
    #[serde(default)]
    container_name: Option<String>,
    image: String,
    #[serde(default)]
    ports: Vec<ComposePort>,
    #[serde(default)]
    environment: Option<ComposeEnvironment>,
    #[serde(default)]
    command: Option<ComposeCommand>,
    #[serde(default)]
    restart: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ComposePort {
    Number(u16),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ComposeEnvironment {
    List(Vec<String>),
    Map(BTreeMap<String, serde_yaml::Value>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ComposeCommand {
    Shell(String),
    Exec(Vec<String>),
}

/// Parse the service named `name` out of a compose template.
///
/// Returns `Ok(None)` when the template has no such service.
pub fn service_from_compose(code: &str, name: &str) -> Result<Option<ServiceSpec>, RuntimeError> {
    let file: ComposeFile = serde_yaml::from_str(code)?;
    let Some((key, service)) = file.services.into_iter().find(|(key, service)| {
        key == name || service.container_name.as_deref() == Some(name)
    }) else {
        debug!("Service {} not present in compose template", name);
        return Ok(None);
    };
    into_spec(key, service).map(Some)
}

/// Parse the first service of a compose template.
pub fn first_service(code: &str) -> Result<Option<ServiceSpec>, RuntimeError> {
    let file: ComposeFile = serde_yaml::from_str(code)?;
    match file.services.into_iter().next() {
        Some((key, service)) => into_spec(key, service).map(Some),
        None => Ok(None),
    }
}

fn into_spec(key: String, service: ComposeService) -> Result<ServiceSpec, RuntimeError> {
    let ports = service
        .ports
        .iter()
        .map(parse_port)
        .collect::<Result<Vec<_>, _>>()?;

    let environment = match service.environment {
        Some(ComposeEnvironment::List(entries)) => entries,
        Some(ComposeEnvironment::Map(entries)) => entries
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, scalar_to_string(&value)))
            .collect(),
        None => Vec::new(),
    };

    let command = service.command.map(|command| match command {
        ComposeCommand::Shell(line) => line.split_whitespace().map(str::to_string).collect(),
        ComposeCommand::Exec(args) => args,
    });

    Ok(ServiceSpec {
        container_name: service.container_name.unwrap_or(key),
        image: service.image,
        ports,
        environment,
        command,
        restart: service.restart,
    })
}

fn parse_port(port: &ComposePort) -> Result<PortMapping, RuntimeError> {
    let text = match port {
        ComposePort::Number(number) => {
            return Ok(PortMapping {
                host_port: None,
                container_port: *number,
            })
        }
        ComposePort::Text(text) => text.trim(),
    };

    // "[ip:]host:container[/proto]"
    let without_proto = text.split('/').next().unwrap_or(text);
    let parts: Vec<&str> = without_proto.split(':').collect();
    let invalid = || RuntimeError::ValidationError(format!("Invalid port mapping: {}", text));

    let (host, container) = match parts.as_slice() {
        [container] => (None, *container),
        [host, container] => (Some(*host), *container),
        [_ip, host, container] => (Some(*host), *container),
        _ => return Err(invalid()),
    };

    Ok(PortMapping {
        host_port: match host {
            Some(host) if !host.is_empty() => Some(host.parse().map_err(|_| invalid())?),
            _ => None,
        },
        container_port: container.parse().map_err(|_| invalid())?,
    })
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
