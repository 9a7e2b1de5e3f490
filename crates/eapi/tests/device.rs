//! End-to-end tests of the `Device` pipeline against a recording stub client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eapi::{
    ApiVersion, CommandInput, CommandOutcome, Credentials, Device, DeviceConfig, EapiError,
    HttpClient, HttpRequest, HttpResponse, OutputFormat, RequestId, RequestOptions, SessionName,
    TransportError,
};
use serde_json::{json, Value};

type Responder = dyn Fn(&Value) -> Result<(u16, Value), TransportError> + Send + Sync;

/// Records every request and answers it with `responder(request_body)`.
struct StubClient {
    responder: Box<Responder>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl StubClient {
    fn new(
        responder: impl Fn(&Value) -> Result<(u16, Value), TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers with `result` built from each submitted command.
    fn echo(output: fn(&str) -> Value) -> Arc<Self> {
        Self::new(move |req| {
            let result: Vec<Value> = commands_of(req).iter().map(|c| output(c)).collect();
            Ok((200, json!({"jsonrpc": "2.0", "id": req["id"], "result": result})))
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn last_body(&self) -> Value {
        let calls = self.calls.lock().unwrap();
        serde_json::from_slice(&calls.last().expect("no calls recorded").body).unwrap()
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        self.calls.lock().unwrap().push(request);
        let (status, reply) = (self.responder)(&body)?;
        Ok(HttpResponse {
            status,
            body: serde_json::to_vec(&reply).unwrap(),
        })
    }
}

fn commands_of(request: &Value) -> Vec<String> {
    request["params"]["cmds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| match c {
            Value::String(s) => s.clone(),
            other => other["cmd"].as_str().unwrap().to_string(),
        })
        .collect()
}

fn device(client: Arc<StubClient>) -> Device {
    let config = DeviceConfig::new("sw1").with_credentials(Credentials::basic("admin", "admin"));
    Device::new(config, client).unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_success_round_trip() {
    let client = StubClient::echo(|cmd| json!({ "command": cmd }));
    let dev = device(client.clone());

    for cmds in [
        vec!["show version"],
        vec!["show hostname", "show version", "show clock", "show interfaces"],
    ] {
        let batch = dev.run(cmds.clone()).await.unwrap();
        assert_eq!(batch.len(), cmds.len());
        for (result, cmd) in batch.iter().zip(&cmds) {
            assert!(result.is_ok());
            assert_eq!(result.command.cmd(), *cmd);
            assert_eq!(result.output().unwrap().as_json().unwrap()["command"], *cmd);
        }
    }
}

#[tokio::test]
async fn partial_failure_truncation() {
    // n = 5 commands, device halts at k = 3
    let client = StubClient::new(|req| {
        Ok((
            200,
            json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {
                    "code": 1002,
                    "message": "CLI command 3 of 5 'show bogus' failed: invalid command",
                    "data": [{"a": 1}, {"b": 2}, {"errors": ["Invalid input (at token 1: 'bogus')"]}]
                }
            }),
        ))
    });
    let dev = device(client);

    let batch = dev
        .run(["show a", "show b", "show bogus", "show d", "show e"])
        .await
        .unwrap();

    let outcomes: Vec<&CommandOutcome> = batch.iter().map(|r| &r.outcome).collect();
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes[0].is_ok() && outcomes[1].is_ok());
    assert!(matches!(outcomes[2], CommandOutcome::Failure(f) if f.code == 1002));
    assert!(outcomes[3].is_not_attempted() && outcomes[4].is_not_attempted());
    assert_eq!(batch.succeeded(), 2);
    assert_eq!(batch.not_attempted(), 2);
}

#[tokio::test]
async fn results_follow_submission_order() {
    // Outputs are tagged by position so any reordering would show.
    let client = StubClient::new(|req| {
        let result: Vec<Value> = (0..commands_of(req).len())
            .map(|i| json!({ "position": i }))
            .collect();
        Ok((200, json!({"id": req["id"], "result": result})))
    });
    let dev = device(client.clone());

    let cmds = ["show z", "show a", "show m", "show b"];
    let batch = dev.run(cmds).await.unwrap();
    for (i, result) in batch.iter().enumerate() {
        assert_eq!(result.command.cmd(), cmds[i]);
        assert_eq!(result.output().unwrap().as_json().unwrap()["position"], i);
    }
    assert_eq!(commands_of(&client.last_body()), cmds);
}

#[tokio::test]
async fn empty_batch_is_rejected_without_io() {
    let client = StubClient::echo(|_| json!({}));
    let dev = device(client.clone());

    let err = dev.run(Vec::<&str>::new()).await.unwrap_err();
    assert!(matches!(err, EapiError::InvalidRequest { .. }));

    let err = dev.run(["show version", "  "]).await.unwrap_err();
    assert!(matches!(err, EapiError::InvalidRequest { .. }));

    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn output_type_follows_requested_format() {
    let client = StubClient::new(|req| {
        let text = req["params"]["format"] == "text";
        let result: Vec<Value> = commands_of(req)
            .iter()
            .map(|_| {
                if text {
                    json!({"output": "Hostname: sw1\nFQDN: sw1.lab\n"})
                } else {
                    json!({"hostname": "sw1", "fqdn": "sw1.lab"})
                }
            })
            .collect();
        Ok((200, json!({"id": req["id"], "result": result})))
    });
    let dev = device(client);

    let json_batch = dev.run(["show hostname"]).await.unwrap();
    let output = json_batch.get(0).unwrap().output().unwrap();
    assert_eq!(output.as_json().unwrap()["hostname"], "sw1");
    assert!(output.as_text().is_none());

    let text_batch = dev
        .run_with(
            ["show hostname"],
            &RequestOptions::new().with_format(OutputFormat::Text),
        )
        .await
        .unwrap();
    let output = text_batch.get(0).unwrap().output().unwrap();
    assert_eq!(output.as_text(), Some("Hostname: sw1\nFQDN: sw1.lab\n"));
    assert!(output.as_json().is_none());
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_success() {
    let client = StubClient::new(|req| {
        Ok((
            200,
            json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "result": [{"hostname": "sw1"}, {"version": "4.28"}]
            }),
        ))
    });
    let dev = device(client);

    let batch = dev.run(["show hostname", "show version"]).await.unwrap();
    assert!(batch.all_ok());
    let outputs = batch.into_outputs().unwrap();
    assert_eq!(serde_json::to_value(&outputs).unwrap(), json!([{"hostname": "sw1"}, {"version": "4.28"}]));
}

#[tokio::test]
async fn scenario_partial_failure() {
    let client = StubClient::new(|req| {
        Ok((
            200,
            json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {
                    "code": 1002,
                    "message": "CLI command 2 of 3 'bogus cmd' failed: invalid command",
                    "data": [{"hostname": "sw1"}, {"errorCode": 1002, "error": "invalid command"}]
                }
            }),
        ))
    });
    let dev = device(client);

    let batch = dev
        .run(["show hostname", "bogus cmd", "show version"])
        .await
        .unwrap();

    let first = batch.get(0).unwrap();
    assert!(first.is_ok());
    assert_eq!(first.output().unwrap().as_json().unwrap()["hostname"], "sw1");

    let second = batch.get(1).unwrap();
    assert!(!second.is_ok());
    assert_eq!(second.failure().unwrap().message, "invalid command");

    assert!(batch.get(2).unwrap().outcome.is_not_attempted());
}

#[tokio::test]
async fn scenario_timeout() {
    let client = StubClient::new(|_| Err(TransportError::Timeout(Duration::from_secs(2))));
    let dev = device(client.clone());

    let err = dev
        .run_with(
            ["show version"],
            &RequestOptions::new().with_timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(err, EapiError::Transport(TransportError::Timeout(d)) if d == Duration::from_secs(2)));
    assert_eq!(client.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn per_call_options_override_defaults() {
    let client = StubClient::echo(|_| json!({}));
    let config = DeviceConfig::new("sw1")
        .with_version(ApiVersion::Latest)
        .with_timeout(Duration::from_secs(9));
    let dev = Device::new(config, client.clone()).unwrap();

    dev.run(["show version"]).await.unwrap();
    {
        let calls = client.calls.lock().unwrap();
        assert_eq!(calls[0].timeout, Duration::from_secs(9));
        assert_eq!(calls[0].url, "https://sw1:443/command-api");
    }
    assert_eq!(client.last_body()["params"]["version"], "latest");
    assert!(client.last_body()["params"].get("autoComplete").is_none());

    let options = RequestOptions::new()
        .with_version(ApiVersion::Number(2))
        .with_auto_complete(true)
        .with_expand_aliases(true)
        .with_request_id(RequestId::new("fixed-id").unwrap())
        .with_timeout(Duration::from_millis(500));
    dev.run_with(["sh ver"], &options).await.unwrap();

    let body = client.last_body();
    assert_eq!(body["id"], "fixed-id");
    assert_eq!(body["params"]["version"], 2);
    assert_eq!(body["params"]["autoComplete"], true);
    assert_eq!(body["params"]["expandAliases"], true);
    assert_eq!(client.calls.lock().unwrap()[1].timeout, Duration::from_millis(500));
}

#[tokio::test]
async fn fresh_request_id_per_call() {
    let client = StubClient::echo(|_| json!({}));
    let dev = device(client.clone());

    dev.run(["show version"]).await.unwrap();
    let first = client.last_body()["id"].clone();
    dev.run(["show version"]).await.unwrap();
    let second = client.last_body()["id"].clone();

    assert!(first.is_string());
    assert_ne!(first, second);
}

#[tokio::test]
async fn structured_commands_are_sent_as_objects() {
    let client = StubClient::echo(|_| json!({}));
    let dev = device(client.clone());

    dev.run([
        CommandInput::Structured {
            cmd: "enable".to_string(),
            input: Some("s3cret".to_string()),
            revision: None,
        },
        CommandInput::from("show version"),
    ])
    .await
    .unwrap();

    assert_eq!(
        client.last_body()["params"]["cmds"],
        json!([{"cmd": "enable", "input": "s3cret"}, "show version"])
    );
}

#[tokio::test]
async fn mismatched_response_id_is_rejected() {
    let client = StubClient::new(|_| Ok((200, json!({"id": "someone-else", "result": [{}]}))));
    let dev = device(client);

    let err = dev.run(["show version"]).await.unwrap_err();
    assert!(matches!(err, EapiError::ProtocolInvariantViolation { .. }));
}

#[tokio::test]
async fn rejected_credentials_surface_distinctly() {
    let client = StubClient::new(|_| Ok((401, json!("Unauthorized"))));
    let dev = device(client);

    let err = dev.run(["show version"]).await.unwrap_err();
    assert!(matches!(err, EapiError::Authentication { status: 401, .. }));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let client = StubClient::echo(|_| json!({}));
    let err = Device::new(DeviceConfig::new(""), client).unwrap_err();
    assert!(matches!(err, EapiError::Configuration { .. }));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_independent() {
    let client = StubClient::echo(|cmd| json!({ "echo": cmd }));
    let dev = device(client.clone());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let dev = dev.clone();
            tokio::spawn(async move {
                let cmds = [format!("show interface Ethernet{i}"), format!("show vlan {i}")];
                let batch = dev.run(cmds.clone()).await.unwrap();
                (cmds, batch)
            })
        })
        .collect();

    for handle in handles {
        let (cmds, batch) = handle.await.unwrap();
        for (result, cmd) in batch.iter().zip(&cmds) {
            assert_eq!(result.output().unwrap().as_json().unwrap()["echo"], *cmd);
        }
    }
    assert_eq!(client.call_count(), 32);
}

// ---------------------------------------------------------------------------
// Strict helpers and configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cli_returns_single_output_or_command_error() {
    let ok = StubClient::echo(|_| json!({"version": "4.28"}));
    let output = device(ok).cli("show version").await.unwrap();
    assert_eq!(output.as_json().unwrap()["version"], "4.28");

    let failing = StubClient::new(|req| {
        Ok((
            200,
            json!({"id": req["id"], "error": {"code": 1002, "message": "invalid command", "data": [{"errors": ["Invalid input"]}]}}),
        ))
    });
    let err = device(failing).cli("show bogus").await.unwrap_err();
    match err {
        EapiError::Command(e) => {
            assert_eq!(e.failed.cmd(), "show bogus");
            assert_eq!(e.message, "Invalid input");
            assert!(e.passed.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn push_config_wraps_lines_in_configure() {
    let client = StubClient::echo(|_| json!({"output": ""}));
    let dev = device(client.clone());

    let contents = "hostname sw1\n\ninterface Ethernet1\n   description uplink\nbanner login MULTILINE: Authorized only\n";
    let batch = dev.push_config(contents, &[], &["end"]).await.unwrap();
    assert_eq!(batch.len(), 6);

    let body = client.last_body();
    assert_eq!(body["params"]["format"], "text");
    assert_eq!(
        body["params"]["cmds"],
        json!([
            "configure",
            "hostname sw1",
            "interface Ethernet1",
            "   description uplink",
            {"cmd": "banner login", "input": "Authorized only\n"},
            "end"
        ])
    );
}

#[tokio::test]
async fn config_session_sequences_commands() {
    let client = StubClient::new(|req| {
        let cmds = commands_of(req);
        let result: Vec<Value> = cmds
            .iter()
            .map(|c| match c.as_str() {
                "show configuration sessions detail" => json!({
                    "maxSavedSessions": 1,
                    "sessions": {"lab": {"state": "pending", "instances": {}}}
                }),
                c if c.starts_with("show session-config") => json!({"output": "+hostname sw1\n"}),
                _ => json!({}),
            })
            .collect();
        Ok((200, json!({"id": req["id"], "result": result})))
    });
    let dev = device(client.clone());
    let session = dev.config_session(SessionName::new("lab").unwrap());

    session.push("hostname sw1\n\n", true).await.unwrap();
    assert_eq!(
        commands_of(&client.last_body()),
        ["configure session lab", "rollback clean-config", "hostname sw1"]
    );

    session.commit(Some("00:05:00")).await.unwrap();
    assert_eq!(
        commands_of(&client.last_body()),
        ["configure session lab commit timer 00:05:00"]
    );

    session.abort().await.unwrap();
    assert_eq!(commands_of(&client.last_body()), ["configure session lab abort"]);

    assert_eq!(session.diff().await.unwrap(), "+hostname sw1\n");

    let status = session.status().await.unwrap().unwrap();
    assert_eq!(status["state"], "pending");

    let other = dev.config_session(SessionName::new("missing").unwrap());
    assert!(other.status().await.unwrap().is_none());

    let calls_before = client.call_count();
    assert!(matches!(
        session.commit(Some("soon")).await,
        Err(EapiError::InvalidRequest { .. })
    ));
    assert_eq!(client.call_count(), calls_before);
}

#[tokio::test]
async fn load_scp_file_reports_copy_errors() {
    let client = StubClient::new(|req| {
        let result: Vec<Value> = commands_of(req)
            .iter()
            .map(|c| {
                if c.starts_with("copy flash:bad.cfg") {
                    json!({"messages": ["% Invalid input (at token 3)"]})
                } else if c.starts_with("copy") {
                    json!({"messages": ["Copy completed successfully."]})
                } else {
                    json!({})
                }
            })
            .collect();
        Ok((200, json!({"id": req["id"], "result": result})))
    });
    let dev = device(client);
    let session = dev.config_session(SessionName::new("lab").unwrap());

    session.load_scp_file("flash:good.cfg", false).await.unwrap();

    match session.load_scp_file("flash:bad.cfg", true).await {
        Err(EapiError::Command(e)) => {
            assert_eq!(e.failed.cmd(), "copy flash:bad.cfg session-config");
            assert_eq!(e.errors, vec!["% Invalid input (at token 3)".to_string()]);
            assert_eq!(e.passed.len(), 2);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Privileged mode
// ---------------------------------------------------------------------------

fn enable_options() -> RequestOptions {
    RequestOptions::new().with_send_enable(true)
}

#[tokio::test]
async fn enable_is_prepended_and_its_result_stripped() {
    let client = StubClient::echo(|cmd| json!({ "echo": cmd }));
    let config = DeviceConfig::new("sw1").with_enable_password("s3cret");
    let dev = Device::new(config, client.clone()).unwrap();

    let batch = dev
        .run_with(["show running-config", "show version"], &enable_options())
        .await
        .unwrap();

    assert_eq!(
        client.last_body()["params"]["cmds"],
        json!([{"cmd": "enable", "input": "s3cret"}, "show running-config", "show version"])
    );
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.get(0).unwrap().command.cmd(), "show running-config");
    assert_eq!(
        batch.get(1).unwrap().output().unwrap().as_json().unwrap()["echo"],
        "show version"
    );
}

#[tokio::test]
async fn enable_without_password_is_sent_plain() {
    let client = StubClient::echo(|_| json!({}));
    let dev = device(client.clone());

    dev.run_with(["show version"], &enable_options()).await.unwrap();
    assert_eq!(
        client.last_body()["params"]["cmds"],
        json!(["enable", "show version"])
    );

    dev.run(["show version"]).await.unwrap();
    assert_eq!(client.last_body()["params"]["cmds"], json!(["show version"]));
}

#[tokio::test]
async fn failed_enable_fails_the_batch() {
    let client = StubClient::new(|req| {
        Ok((
            200,
            json!({
                "id": req["id"],
                "error": {
                    "code": 1002,
                    "message": "CLI command 1 of 3 'enable' failed: invalid command",
                    "data": [{"errors": ["Bad secret"]}]
                }
            }),
        ))
    });
    let config = DeviceConfig::new("sw1").with_enable_password("wrong");
    let dev = Device::new(config, client).unwrap();

    match dev.run_with(["show a", "show b"], &enable_options()).await {
        Err(EapiError::Command(e)) => {
            assert_eq!(e.failed.cmd(), "enable");
            assert_eq!(e.failed.input(), "");
            assert_eq!(e.message, "Bad secret");
            assert!(e.passed.is_empty());
            let skipped: Vec<&str> = e.not_executed.iter().map(|c| c.cmd()).collect();
            assert_eq!(skipped, ["show a", "show b"]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn partial_failure_indices_ignore_enable() {
    let client = StubClient::new(|req| {
        Ok((
            200,
            json!({
                "id": req["id"],
                "error": {
                    "code": 1002,
                    "message": "CLI command 3 of 4 'show bogus' failed: invalid command",
                    "data": [{}, {"hostname": "sw1"}, {"errors": ["Invalid input"]}]
                }
            }),
        ))
    });
    let dev = device(client);

    let batch = dev
        .run_with(["show hostname", "show bogus", "show version"], &enable_options())
        .await
        .unwrap();

    assert_eq!(batch.len(), 3);
    assert!(batch.get(0).unwrap().is_ok());
    let (index, failed) = batch.first_failure().unwrap();
    assert_eq!(index, 1);
    assert_eq!(failed.command.cmd(), "show bogus");
    assert!(batch.get(2).unwrap().outcome.is_not_attempted());
}

#[tokio::test]
async fn enable_does_not_mask_an_empty_batch() {
    let client = StubClient::echo(|_| json!({}));
    let dev = device(client.clone());

    let err = dev
        .run_with(Vec::<&str>::new(), &enable_options())
        .await
        .unwrap_err();
    assert!(matches!(err, EapiError::InvalidRequest { .. }));
    assert_eq!(client.call_count(), 0);
}

#[test]
fn session_names_cannot_smuggle_commands() {
    assert!(SessionName::new("lab abort").is_none());
    assert!(SessionName::new("lab\ncommit").is_none());
    assert!(SessionName::new("lab").is_some());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Sets its flag when dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Holds a guard for the lifetime of the request and never answers.
struct HangingClient {
    released: Arc<AtomicBool>,
    entered: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl HttpClient for HangingClient {
    async fn post(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let _guard = ReleaseGuard(self.released.clone());
        self.entered.notify_one();
        std::future::pending::<Result<HttpResponse, TransportError>>().await
    }
}

fn hanging_device() -> (Device, Arc<AtomicBool>, Arc<tokio::sync::Notify>) {
    let released = Arc::new(AtomicBool::new(false));
    let entered = Arc::new(tokio::sync::Notify::new());
    let client = Arc::new(HangingClient {
        released: released.clone(),
        entered: entered.clone(),
    });
    let dev = Device::new(DeviceConfig::new("sw1"), client).unwrap();
    (dev, released, entered)
}

#[tokio::test]
async fn dropping_a_call_releases_the_request() {
    let (dev, released, _entered) = hanging_device();

    let outcome =
        tokio::time::timeout(Duration::from_millis(50), dev.run(["show version"])).await;

    assert!(outcome.is_err(), "call should still have been in flight");
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn aborting_a_task_releases_the_request() {
    let (dev, released, entered) = hanging_device();

    let task = tokio::spawn(async move { dev.run(["show version"]).await });
    entered.notified().await;
    assert!(!released.load(Ordering::SeqCst));

    task.abort();
    let joined = task.await;
    assert!(joined.unwrap_err().is_cancelled());
    assert!(released.load(Ordering::SeqCst));
}
