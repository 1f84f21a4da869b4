use std::path::PathBuf;

use serde_json::{json, Value};

use super::Session;
use crate::config::QaConfig;

/// `config.*` commands. `None` when the command is not one of them.
pub fn handle(cmd: &str, payload: &Value, session: &Session) -> Option<Result<Value, String>> {
    match cmd {
        "config.open" => {
            let path = payload.get("path").and_then(|v| v.as_str()).unwrap_or("");
            if path.is_empty() {
                return Some(Err("payload.path is required".into()));
            }

            Some(
                QaConfig::load(&PathBuf::from(path))
                    .map_err(|e| e.to_string())
                    .and_then(|cfg| {
                        session.apply_config(cfg.clone())?;
                        Ok(json!({ "config": cfg }))
                    }),
            )
        }

        "config.save" => {
            let path = payload.get("path").and_then(|v| v.as_str()).unwrap_or("");
            if path.is_empty() {
                return Some(Err("payload.path is required".into()));
            }

            let cfg = match payload.get("config").cloned() {
                None | Some(Value::Null) => session.config(),
                Some(v) => match serde_json::from_value::<QaConfig>(v) {
                    Ok(c) => c,
                    Err(e) => return Some(Err(format!("invalid payload.config: {e}"))),
                },
            };

            Some(
                cfg.save(&PathBuf::from(path))
                    .map(|saved| json!({ "config": saved }))
                    .map_err(|e| e.to_string()),
            )
        }

        _ => None,
    }
}
