//! Built-in configuration defaults

use std::path::Path;

use serde_json::{json, Map, Value};

/// Default values for every key the controller reads.
///
/// `root` anchors the data directories (replays, logs).
pub fn builtin(root: &Path) -> Map<String, Value> {
    let data = root.join("data");
    let defaults = json!({
        "NAME": gethostname::gethostname().to_string_lossy(),
        "CORE_HOST": "http://127.0.0.1:8080",
        "ACCESS_KEY": "",
        "ROOT_PATH": root.to_string_lossy(),
        "DEBUG": false,
        "BIND_HOST": "0.0.0.0",
        "SSHD_PORT": 2222,
        "HTTPD_PORT": 5000,
        "LOG_LEVEL": "INFO",
        "LOG_DIR": data.join("logs").to_string_lossy(),
        "REPLAY_DIR": data.join("replays").to_string_lossy(),
        "HOST_KEY": "",
        "SSH_TIMEOUT": 15,
        "ALLOW_SSH_USER": [],
        "BLOCK_SSH_USER": [],
        "HEARTBEAT_INTERVAL": 20,
        "COMMAND_STORAGE": {"TYPE": "server"},
        "REPLAY_STORAGE": {"TYPE": "server"},
        "LANGUAGE_CODE": "zh",
        "SECURITY_MAX_IDLE_TIME": 60,
        "UPLOAD_FAILED_REPLAY_ON_START": true,
    });

    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
