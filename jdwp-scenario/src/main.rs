// JDWP breakpoint scenario driver
//
// Drives the breakpoint core against in-memory debug targets over
// line-delimited JSON-RPC on stdio

use anyhow::{Context, Result};
use jdwp_breakpoints::CoreConfig;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

mod handlers;
mod protocol;
mod session;

use handlers::RequestHandler;
use protocol::*;

const CONFIG_ENV: &str = "JDWP_SCENARIO_CONFIG";

fn load_config(path: Option<&str>) -> Result<CoreConfig> {
    match path {
        Some(path) => {
            CoreConfig::load(path).with_context(|| format!("loading config from {}", path))
        }
        None => Ok(CoreConfig::default()),
    }
}

async fn write_response<W>(out: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response_str = serde_json::to_string(response)?;
    debug!("Sending: {}", response_str);
    out.write_all(response_str.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jdwp_scenario=info".parse()?)
                .add_directive("jdwp_breakpoints=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::var(CONFIG_ENV).ok();
    let config = load_config(config_path.as_deref())?;
    info!("Starting JDWP scenario driver ({:?})", config);

    let handler = RequestHandler::new(config);
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Client disconnected");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!("Received: {}", line);

                let value = match serde_json::from_str::<Value>(line) {
                    Ok(value) => value,
                    Err(e) => {
                        error!("Parse error: {}", e);
                        let response =
                            JsonRpcResponse::failure(Value::Null, JsonRpcError::new(PARSE_ERROR, "Parse error"));
                        write_response(&mut stdout, &response).await?;
                        continue;
                    }
                };

                if value.get("id").is_some() {
                    let response = match serde_json::from_value::<JsonRpcRequest>(value) {
                        Ok(request) => handler.handle_request(request).await,
                        Err(e) => {
                            error!("Invalid request: {}", e);
                            JsonRpcResponse::failure(
                                Value::Null,
                                JsonRpcError::new(INVALID_REQUEST, "Invalid request"),
                            )
                        }
                    };
                    write_response(&mut stdout, &response).await?;
                } else {
                    match serde_json::from_value::<JsonRpcNotification>(value) {
                        Ok(notification) => {
                            let exit = notification.method == "exit";
                            handler.handle_notification(notification).await;
                            if exit {
                                break;
                            }
                        }
                        Err(e) => error!("Invalid notification: {}", e),
                    }
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    info!("JDWP scenario driver shutting down");
    Ok(())
}
