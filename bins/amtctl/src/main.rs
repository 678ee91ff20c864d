// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod config;
mod templates;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wsman_client::{
    resolve_call, resolve_method, ClientError, Outcome, WsmanClient, WsmanResponse,
};
use wsman_core::{ApiCall, Credentials, SessionEndpoint, WsmanMethod};
use wsman_observe::{set_transport_metrics, TracingTransportMetrics};

use crate::config::{merge, FileConfig, Overrides};
use crate::templates::TemplateDir;

/// Runs one WS-Management call against an Intel AMT device and prints the
/// JSON outcome.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Device address (IP or hostname)
    #[arg(long)]
    host: Option<String>,
    /// Device port (16992 when omitted)
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    username: Option<String>,
    /// Falls back to the config file, then AMT_PASSWORD
    #[arg(long)]
    password: Option<String>,
    /// Directory of `<Class>_<Method>.xml` envelope templates
    #[arg(long)]
    templates: Option<PathBuf>,
    /// Frame request bodies with chunked transfer encoding
    #[arg(long)]
    chunked: bool,
    /// Per-request deadline in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Checks the credentials with a general settings read
    Login,
    /// Invokes one method on a class, e.g. `call AMT_GeneralSettings Get`
    Call {
        class: String,
        method: String,
        /// File whose contents replace `{{extra}}` in the template
        #[arg(long)]
        extra: Option<PathBuf>,
    },
    /// Enumerates a class and pulls the results
    Pull { class: String },
    /// Sends a complete SOAP envelope read from a file
    Send { body: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    set_transport_metrics(Arc::new(TracingTransportMetrics));

    let args = Args::parse();
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = merge(
        file,
        Overrides {
            host: args.host,
            port: args.port,
            username: args.username,
            password: args.password,
            templates: args.templates,
            chunked: args.chunked,
            request_timeout_ms: args.request_timeout_ms,
        },
        std::env::var("AMT_PASSWORD").ok(),
    )?;

    let endpoint = SessionEndpoint::new(settings.host.as_str(), settings.port);
    let builder = settings
        .templates
        .map(|dir| TemplateDir::new(dir, endpoint.authority()));
    // Arguments are checked before the device is contacted.
    let job = match plan(args.command, builder)? {
        Ok(job) => job,
        Err(err) => return print_outcome(Err(err)),
    };

    let credentials = Credentials::new(settings.username.as_str(), settings.password.as_str());
    info!(peer = %endpoint, framing = ?settings.client.framing, "connecting");
    let client = match WsmanClient::connect(endpoint, credentials, settings.client).await {
        Ok(client) => client,
        Err(err) => return print_outcome(Err(err)),
    };

    let result = run(&client, job).await;
    client.disconnect().await;
    print_outcome(result)
}

/// A command with its arguments resolved.
#[derive(Debug)]
enum Job {
    Send(String),
    Login(TemplateDir),
    Call {
        builder: TemplateDir,
        call: ApiCall,
        method: WsmanMethod,
        extra: Option<String>,
    },
    Pull {
        builder: TemplateDir,
        call: ApiCall,
    },
}

/// Resolves `command` without touching the network. Unknown classes and
/// methods come back as the inner error so they are reported as an outcome.
fn plan(command: Command, builder: Option<TemplateDir>) -> Result<Result<Job, ClientError>> {
    let templates = || builder.context("this command needs --templates");
    Ok(match command {
        Command::Send { body } => Ok(Job::Send(read_file(&body)?)),
        Command::Login => Ok(Job::Login(templates()?)),
        Command::Call {
            class,
            method,
            extra,
        } => {
            let extra = extra.as_deref().map(read_file).transpose()?;
            let resolved = resolve_call(&class).and_then(|call| {
                let method = resolve_method(&method)?;
                check_allowed(&call, method)?;
                Ok((call, method))
            });
            match resolved {
                Ok((call, method)) => Ok(Job::Call {
                    builder: templates()?,
                    call,
                    method,
                    extra,
                }),
                Err(err) => Err(err),
            }
        }
        Command::Pull { class } => match resolve_call(&class) {
            Ok(call) => Ok(Job::Pull {
                builder: templates()?,
                call,
            }),
            Err(err) => Err(err),
        },
    })
}

fn check_allowed(call: &ApiCall, method: WsmanMethod) -> Result<(), ClientError> {
    if call.supports(method) {
        Ok(())
    } else {
        Err(ClientError::Unsupported(format!(
            "{} does not allow {}",
            call, method
        )))
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

async fn run(client: &WsmanClient, job: Job) -> Result<WsmanResponse, ClientError> {
    match job {
        Job::Send(body) => client.send(&body).await,
        Job::Login(builder) => client.authenticate(&builder).await,
        Job::Call {
            builder,
            call,
            method,
            extra,
        } => {
            client
                .submit(&builder, &call, method, extra.as_deref())
                .await
        }
        Job::Pull { builder, call } => client.pull(&builder, &call).await,
    }
}

fn print_outcome(result: Result<WsmanResponse, ClientError>) -> Result<()> {
    if let Err(err) = &result {
        warn!(kind = err.kind().as_str(), error = %err, "call failed");
    }
    let outcome = Outcome::from(result);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if outcome.is_success() {
        Ok(())
    } else {
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates() -> Option<TemplateDir> {
        Some(TemplateDir::new("/nonexistent", "10.0.0.5:16992"))
    }

    #[test]
    fn unknown_class_is_rejected_up_front() {
        let command = Command::Call {
            class: "AMT_NoSuchThing".into(),
            method: "Get".into(),
            extra: None,
        };
        let err = plan(command, templates()).unwrap().err().unwrap();
        assert_eq!(err.kind(), wsman_client::ErrorKind::Unsupported);

        let command = Command::Pull {
            class: "XYZ_Processor".into(),
        };
        assert!(plan(command, templates()).unwrap().is_err());
    }

    #[test]
    fn disallowed_method_is_rejected_up_front() {
        let command = Command::Call {
            class: "CIM_Processor".into(),
            method: "Delete".into(),
            extra: None,
        };
        let err = plan(command, templates()).unwrap().err().unwrap();
        assert_eq!(
            err,
            ClientError::Unsupported("CIM_Processor does not allow Delete".into())
        );
    }

    #[test]
    fn template_commands_need_a_directory() {
        assert!(plan(Command::Login, None).is_err());
        let command = Command::Pull {
            class: "CIM_Processor".into(),
        };
        assert!(plan(command, None).is_err());
        assert!(matches!(
            plan(Command::Login, templates()),
            Ok(Ok(Job::Login(_)))
        ));
    }
}
