//! JSON-lines command protocol spoken with the presentation layer.
//!
//! Requests are `{"id", "cmd", "payload"}`; replies are `{"id", "status", "payload"}`
//! or `{"id", "status": "error", "message"}`. A running scan additionally streams
//! `{"id", "event", ...}` lines carrying the same id as the `scan` request.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use serde_json::{json, Value};

use crate::config::QaConfig;
use crate::model::entry::IdentityPolicy;
use crate::model::event::ScanEvent;
use crate::parsers::kirikiri;
use crate::services::pipeline::{CancelFlag, ScanRequest, Scanner};
use crate::services::qa::Analyzer;
use crate::services::suggest::Suggester;
use crate::services::{encoding, matcher};

mod command;
mod config;
use command::Command;

/// Sink for complete output lines; shared with scan threads.
pub type Output = Arc<dyn Fn(String) + Send + Sync>;

struct ActiveScan {
    cancel: CancelFlag,
    handle: JoinHandle<()>,
}

pub struct Session {
    config: Mutex<QaConfig>,
    suggester: Mutex<Arc<Suggester>>,
    offline: bool,
    out: Output,
    active_scan: Mutex<Option<ActiveScan>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Session {
    pub fn new(config: QaConfig, offline: bool, out: Output) -> Arc<Self> {
        let suggester = Arc::new(config.build_suggester(offline));
        Arc::new(Self {
            config: Mutex::new(config),
            suggester: Mutex::new(suggester),
            offline,
            out,
            active_scan: Mutex::new(None),
        })
    }

    pub fn config(&self) -> QaConfig {
        lock(&self.config).clone()
    }

    /// Swaps in a new config. The current cache is flushed before the new one
    /// is loaded, and the swap is refused while a scan still writes to it.
    pub fn apply_config(&self, cfg: QaConfig) -> Result<(), String> {
        let active = lock(&self.active_scan);
        if active.as_ref().is_some_and(|scan| !scan.handle.is_finished()) {
            return Err("a scan is running; cancel it before changing config".into());
        }

        let mut suggester = lock(&self.suggester);
        suggester.flush();
        *suggester = Arc::new(cfg.build_suggester(self.offline));
        drop(suggester);
        drop(active);

        *lock(&self.config) = cfg;
        Ok(())
    }

    fn suggester(&self) -> Arc<Suggester> {
        lock(&self.suggester).clone()
    }

    fn emit(&self, line: String) {
        (self.out)(line);
    }

    /// Stops a running scan, waits for it and persists the cache.
    pub fn shutdown(&self) {
        let active = lock(&self.active_scan).take();
        if let Some(scan) = active {
            scan.cancel.cancel();
            let _ = scan.handle.join();
        }
        self.suggester().flush();
    }
}

fn get_cmd(req: &Value) -> &str {
    req.get("cmd").and_then(|v| v.as_str()).unwrap_or("")
}

fn get_id(req: &Value) -> Value {
    req.get("id").cloned().unwrap_or(Value::Null)
}

fn get_payload(req: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    req.get("payload").unwrap_or(&EMPTY)
}

fn get_str<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn ok(id: Value, payload: Value) -> String {
    json!({
        "id": id,
        "status": "ok",
        "payload": payload
    })
    .to_string()
}

fn err(id: Value, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "status": "error",
        "message": message.into()
    })
    .to_string()
}

pub fn event_line(id: &Value, event: &ScanEvent) -> String {
    let mut v = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut v {
        map.insert("id".to_string(), id.clone());
    }
    v.to_string()
}

/// Handles one request line. Returns the reply, or `None` when the reply was
/// already written to the session output (scans).
pub fn handle(session: &Arc<Session>, input: &str) -> Option<String> {
    let req: Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(_) => {
            return Some(
                json!({
                    "status": "error",
                    "message": "invalid json"
                })
                .to_string(),
            );
        }
    };

    let id = get_id(&req);
    let cmd_str = get_cmd(&req);
    let payload = get_payload(&req);

    let reply = match Command::from(cmd_str) {
        Command::Ping => ok(id, json!({ "message": "sekai-qa alive" })),

        Command::DetectEncoding => {
            let path = get_str(payload, "path");
            if path.is_empty() {
                return Some(err(id, "payload.path is required"));
            }
            match encoding::detect_from_file(&PathBuf::from(path)) {
                Ok(result) => ok(id, serde_json::to_value(result).unwrap_or(json!({}))),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::ExtractDialogue => {
            let path = get_str(payload, "path");
            if path.is_empty() {
                return Some(err(id, "payload.path is required"));
            }
            let policy = match payload.get("policy").and_then(|v| v.as_str()) {
                Some(p) => IdentityPolicy::from(p),
                None => session.config().identity_policy,
            };
            match kirikiri::read_dialogue(&PathBuf::from(path), policy) {
                Ok(set) => ok(id, json!({ "entries": set.entries() })),
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::MatchFiles => {
            let source_path = get_str(payload, "source_path");
            let translated_path = get_str(payload, "translated_path");
            if source_path.is_empty() || translated_path.is_empty() {
                return Some(err(id, "payload.source_path and payload.translated_path are required"));
            }
            let policy = session.config().identity_policy;
            let sets = kirikiri::read_dialogue(&PathBuf::from(source_path), policy).and_then(|s| {
                kirikiri::read_dialogue(&PathBuf::from(translated_path), policy).map(|t| (s, t))
            });
            match sets {
                Ok((source, translated)) => {
                    let (pairs, stats) = matcher::match_sets_with_stats(&source, &translated);
                    ok(id, json!({ "pairs": pairs, "stats": stats }))
                }
                Err(e) => err(id, e.to_string()),
            }
        }

        Command::AnalyzePair => {
            let source_text = get_str(payload, "source_text");
            if source_text.trim().is_empty() {
                return Some(err(id, "payload.source_text is required"));
            }
            let translated_text = get_str(payload, "translated_text");
            let cfg = session.config();
            let target_lang = match get_str(payload, "target_lang") {
                "" => cfg.target_language.clone(),
                t => t.to_string(),
            };
            let analyzer = Analyzer::new(session.suggester(), &cfg.source_language, &target_lang);
            let result = analyzer.analyze(source_text, translated_text);
            ok(id, json!({ "result": result }))
        }

        Command::Scan => return start_scan(session, id, payload),

        Command::ScanCancel => {
            let cancelled = match lock(&session.active_scan).as_ref() {
                Some(scan) if !scan.handle.is_finished() => {
                    scan.cancel.cancel();
                    true
                }
                _ => false,
            };
            ok(id, json!({ "cancelled": cancelled }))
        }

        Command::ConfigOpen | Command::ConfigSave => match config::handle(cmd_str, payload, session) {
            Some(Ok(v)) => ok(id, v),
            Some(Err(e)) => err(id, e),
            None => err(id, "unknown command"),
        },

        Command::Unknown => err(id, "unknown command"),
    };

    Some(reply)
}

fn start_scan(session: &Arc<Session>, id: Value, payload: &Value) -> Option<String> {
    let source_dir = get_str(payload, "source_dir");
    let translated_dir = get_str(payload, "translated_dir");
    if source_dir.is_empty() || translated_dir.is_empty() {
        return Some(err(id, "payload.source_dir and payload.translated_dir are required"));
    }

    let cfg = session.config();
    let target_lang = match get_str(payload, "target_lang") {
        "" => cfg.target_language.clone(),
        t => t.to_string(),
    };
    let req = ScanRequest {
        source_dir: PathBuf::from(source_dir),
        translated_dir: PathBuf::from(translated_dir),
        target_lang,
    };

    let mut active = lock(&session.active_scan);
    if active.as_ref().is_some_and(|scan| !scan.handle.is_finished()) {
        return Some(err(id, "a scan is already running"));
    }

    let scanner = Scanner::new(session.suggester(), cfg.scan_options());
    let cancel = scanner.cancel_flag();

    // Ack first so it precedes every event of this scan.
    session.emit(ok(id.clone(), json!({ "started": true })));

    let worker_session = Arc::clone(session);
    let handle = thread::spawn(move || {
        let out = worker_session.out.clone();
        if let Err(e) = scanner.run(&req, |event| out(event_line(&id, &event))) {
            tracing::error!("scan failed: {e}");
            out(err(id.clone(), e.to_string()));
        }
    });

    *active = Some(ActiveScan { cancel, handle });
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session(temp: &TempDir) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let out: Output = Arc::new(move |line: String| {
            let _ = lock(&tx).send(line);
        });
        let cfg = QaConfig {
            cache_path: Some(temp.path().join("cache.json")),
            ..QaConfig::default()
        };
        (Session::new(cfg, true, out), rx)
    }

    fn reply(session: &Arc<Session>, req: Value) -> Value {
        let line = handle(session, &req.to_string()).expect("immediate reply");
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn test_ping_and_errors() {
        let temp = TempDir::new().unwrap();
        let (s, _rx) = session(&temp);

        let v = reply(&s, json!({"id": 1, "cmd": "ping"}));
        assert_eq!(v["status"], "ok");
        assert_eq!(v["id"], 1);

        let v = reply(&s, json!({"id": 2, "cmd": "nope"}));
        assert_eq!(v["status"], "error");

        let line = handle(&s, "{not json").unwrap();
        assert!(line.contains("invalid json"));
    }

    #[test]
    fn test_analyze_pair() {
        let temp = TempDir::new().unwrap();
        let (s, _rx) = session(&temp);

        let v = reply(
            &s,
            json!({"id": "a", "cmd": "analyze_pair", "payload": {
                "source_text": "彼女は怒っている", "translated_text": "He is angry"
            }}),
        );
        assert_eq!(v["payload"]["result"]["kind"], "pronoun_mismatch");
        assert_eq!(v["payload"]["result"]["severity"], 2);
        assert_eq!(v["payload"]["result"]["highlights"][0]["text"], "He");
    }

    #[test]
    fn test_scan_streams_events_with_request_id() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("jp");
        let tl = temp.path().join("en");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&tl).unwrap();
        fs::write(src.join("a.ks"), "「ただいま」\n").unwrap();
        fs::write(tl.join("a.ks"), "Hi'''\n").unwrap();

        let (s, rx) = session(&temp);
        let none = handle(
            &s,
            &json!({"id": 7, "cmd": "scan", "payload": {
                "source_dir": src.to_string_lossy(),
                "translated_dir": tl.to_string_lossy()
            }})
            .to_string(),
        );
        assert!(none.is_none());

        let mut lines = Vec::new();
        loop {
            let line = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            let v: Value = serde_json::from_str(&line).unwrap();
            let done = v["event"] == "finished";
            lines.push(v);
            if done {
                break;
            }
        }
        s.shutdown();

        assert_eq!(lines[0]["payload"]["started"], true);
        assert!(lines.iter().all(|v| v["id"] == 7));
        let batch = lines.iter().find(|v| v["event"] == "batch").unwrap();
        assert_eq!(batch["records"][0]["kind"], "symbol_anomaly");
        assert_eq!(lines.last().unwrap()["total_defects"], 1);
    }

    #[test]
    fn test_apply_config_keeps_pending_suggestions() {
        use crate::services::suggest::cache::SuggestionCache;
        use crate::services::suggest::testing::EchoProvider;

        let temp = TempDir::new().unwrap();
        let (s, _rx) = session(&temp);
        let path = temp.path().join("cache.json");

        *lock(&s.suggester) = Arc::new(Suggester::new(
            SuggestionCache::load(&path),
            Some(Box::new(EchoProvider::default())),
        ));
        for text in ["一", "二", "三"] {
            s.suggester().suggest(text, "ja", "en");
        }

        s.apply_config(s.config()).unwrap();

        assert_eq!(s.suggester().cached(), 3);
        assert_eq!(SuggestionCache::load(&path).len(), 3);
    }

    #[test]
    fn test_config_change_refused_during_scan() {
        let temp = TempDir::new().unwrap();
        let (s, _rx) = session(&temp);

        let (release, wait) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let _ = wait.recv();
        });
        *lock(&s.active_scan) = Some(ActiveScan {
            cancel: CancelFlag::default(),
            handle,
        });

        assert!(s.apply_config(s.config()).is_err());

        let path = temp.path().join("qa.json");
        s.config().save(&path).unwrap();
        let v = reply(
            &s,
            json!({"id": 3, "cmd": "config.open", "payload": { "path": path.to_string_lossy() }}),
        );
        assert_eq!(v["status"], "error");

        drop(release);
        s.shutdown();
        assert!(s.apply_config(s.config()).is_ok());
    }
}
