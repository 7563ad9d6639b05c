//! Built-in handler registration.
//!
//! One registration call site for the fixed channel set the web UI expects.
//! File and process channels have real bodies; UI-facing channels (dialogs,
//! auth, window control) delegate to [`NativeServices`], whose
//! implementations live outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use pontoon_common::{BridgeError, Result};

use crate::dispatcher::Dispatcher;

/// Native collaborators the dispatcher routes to but does not implement:
/// OS dialogs, auth, and window control.
#[async_trait]
pub trait NativeServices: Send + Sync {
    /// Open an OS folder picker; empty string when cancelled.
    async fn open_folder_dialog(&self) -> Result<String>;

    /// Show a modal message box and wait for dismissal.
    async fn show_message_box(&self, message: &str) -> Result<()>;

    /// Current auth token.
    async fn auth_token(&self) -> Result<String>;

    /// Profile of the signed-in user.
    async fn auth_profile(&self) -> Result<Value>;

    /// Close the main application window.
    async fn close_main_window(&self) -> Result<()>;
}

/// Register the full built-in channel set on a dispatcher.
///
/// Channels: `version`, `status`, `platform`, `openFolderDialog`, `readFile`,
/// `saveFile`, `readdir`, `showMessageBox`, `getToken`, `getAuthProfile`,
/// `closeMainWindow`, `runCommand`, `getUserHost`.
pub fn register_builtin_handlers(dispatcher: &Dispatcher, services: Arc<dyn NativeServices>) {
    dispatcher.handle("version", |_args| async {
        Ok(json!(env!("CARGO_PKG_VERSION")))
    });

    dispatcher.handle("status", |_args| async { Ok(json!("Running")) });

    dispatcher.handle("platform", |_args| async {
        Ok(json!(std::env::consts::OS))
    });

    dispatcher.handle("readFile", |args| async move {
        let path = arg_str(&args, 0, "readFile")?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| BridgeError::Handler(format!("readFile {path}: {e}")))?;
        Ok(json!(content))
    });

    dispatcher.handle("saveFile", |args| async move {
        let path = arg_str(&args, 0, "saveFile")?;
        let content = arg_str(&args, 1, "saveFile")?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| BridgeError::Handler(format!("saveFile {path}: {e}")))?;
        Ok(json!("File saved successfully"))
    });

    dispatcher.handle("readdir", |args| async move {
        let path = arg_str(&args, 0, "readdir")?;
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| BridgeError::Handler(format!("readdir {path}: {e}")))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BridgeError::Handler(format!("readdir {path}: {e}")))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                files.push(json!(entry.path().to_string_lossy()));
            }
        }
        Ok(Value::Array(files))
    });

    dispatcher.handle("runCommand", |args| async move {
        let command = arg_str(&args, 0, "runCommand")?;
        if command.trim().is_empty() {
            return Err(BridgeError::Handler("command cannot be empty".into()));
        }
        run_shell_command(&command).await
    });

    dispatcher.handle("getUserHost", |_args| async {
        Ok(json!({
            "username": env_any(&["USER", "USERNAME"]),
            "hostname": env_any(&["HOSTNAME", "COMPUTERNAME"]),
        }))
    });

    {
        let services = services.clone();
        dispatcher.handle("openFolderDialog", move |_args| {
            let services = services.clone();
            async move { Ok(json!(services.open_folder_dialog().await?)) }
        });
    }

    {
        let services = services.clone();
        dispatcher.handle("showMessageBox", move |args| {
            let services = services.clone();
            async move {
                let message = arg_str(&args, 0, "showMessageBox")?;
                services.show_message_box(&message).await?;
                Ok(json!("Message shown"))
            }
        });
    }

    {
        let services = services.clone();
        dispatcher.handle("getToken", move |_args| {
            let services = services.clone();
            async move { Ok(json!(services.auth_token().await?)) }
        });
    }

    {
        let services = services.clone();
        dispatcher.handle("getAuthProfile", move |_args| {
            let services = services.clone();
            async move { services.auth_profile().await }
        });
    }

    dispatcher.handle("closeMainWindow", move |_args| {
        let services = services.clone();
        async move {
            services.close_main_window().await?;
            Ok(json!("Main window closed"))
        }
    });

    info!("built-in handlers registered");
}

fn arg_str(args: &[Value], index: usize, channel: &str) -> Result<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(BridgeError::Handler(format!(
            "{channel}: argument {index} must be a string, got {other}"
        ))),
        None => Err(BridgeError::Handler(format!(
            "{channel}: missing argument {index}"
        ))),
    }
}

fn env_any(keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| std::env::var(key).ok())
        .unwrap_or_default()
}

async fn run_shell_command(command: &str) -> Result<Value> {
    let output = if cfg!(windows) {
        tokio::process::Command::new("cmd")
            .args(["/C", command])
            .output()
            .await
    } else {
        tokio::process::Command::new("sh")
            .args(["-c", command])
            .output()
            .await
    }
    .map_err(|e| BridgeError::Handler(format!("runCommand: {e}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        Ok(json!(String::from_utf8_lossy(&output.stdout)))
    } else {
        // The reference surface reports shell stderr inside the result
        // string, not as a failed call.
        Ok(json!(format!("Error: {stderr}")))
    }
}
