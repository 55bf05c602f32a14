//! Flagbook Rust SDK Lab
//!
//! Internal verification script for SDK functionality. Starts a local
//! WebSocket flag service and drives a real client against it.
//! Run with: cargo run --example sdk-lab
//! Set RUST_LOG=flagbook=debug to watch the channel lifecycle.

use flagbook::{FlagbookClient, FlagbookOptions, ReconnectPolicy, Tags};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing_subscriber::EnvFilter;

const PASS: &str = "\x1b[32m[PASS]\x1b[0m";
const FAIL: &str = "\x1b[31m[FAIL]\x1b[0m";

/// Flags known to the lab service: name, required tag, value.
const LAB_FLAGS: &[(&str, Option<(&str, &str)>, bool)] = &[
    ("lab-on", None, true),
    ("lab-off", None, false),
    ("lab-pro", Some(("plan", "pro")), true),
];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flagbook=info")),
        )
        .init();

    println!("=== Flagbook Rust SDK Lab ===\n");

    let mut passed = 0;
    let mut failed = 0;

    macro_rules! pass {
        ($test:expr) => {{
            println!("{} {}", PASS, $test);
            passed += 1;
        }};
    }

    macro_rules! fail {
        ($test:expr) => {{
            println!("{} {}", FAIL, $test);
            failed += 1;
        }};
    }

    let requests = Arc::new(AtomicUsize::new(0));
    let port = match start_lab_service(Arc::clone(&requests)).await {
        Ok(port) => port,
        Err(e) => {
            fail!(format!("Lab service - {}", e));
            print_summary(passed, failed);
            std::process::exit(1);
        }
    };

    // Test 1: Client creation
    println!("Testing initialization...");
    let options = FlagbookOptions::builder()
        .access_token("lab-token")
        .base_url(format!("ws://127.0.0.1:{}/ws/", port))
        .cache_ttl(Duration::from_millis(500))
        .timeout(Duration::from_secs(2))
        .reconnect(ReconnectPolicy::fixed(Duration::from_millis(100)))
        .build();

    let client = match FlagbookClient::new(options) {
        Ok(c) => c,
        Err(e) => {
            fail!(format!("Initialization - {}", e));
            print_summary(passed, failed);
            std::process::exit(1);
        }
    };
    pass!("Initialization");

    // Test 2: Flag evaluation
    println!("\nTesting flag evaluation...");
    match client.get_flag_value("lab-on", None).await {
        Ok(true) => pass!("get_flag_value() true"),
        other => fail!(format!("get_flag_value() - expected Ok(true), got {:?}", other)),
    }

    match client.get_flag_value("lab-off", None).await {
        Ok(false) => pass!("get_flag_value() false"),
        other => fail!(format!("get_flag_value() - expected Ok(false), got {:?}", other)),
    }

    // Test 3: Tags
    let pro = Tags::new().with("plan", "pro");
    match client.get_flag_value("lab-pro", Some(&pro)).await {
        Ok(true) => pass!("get_flag_value() with tags"),
        other => fail!(format!("Tagged flag - expected Ok(true), got {:?}", other)),
    }

    // Test 4: Remote error
    match client.get_flag_value("lab-missing", None).await {
        Err(e) if e.is_remote_error() => pass!("Remote error surfaced"),
        other => fail!(format!("Unknown flag - expected remote error, got {:?}", other)),
    }

    // Test 5: Cache
    println!("\nTesting cache...");
    let before = requests.load(Ordering::SeqCst);
    let cached = client.get_flag_value("lab-on", None).await;
    if matches!(cached, Ok(true)) && requests.load(Ordering::SeqCst) == before {
        pass!("Cache hit without network");
    } else {
        fail!("Cache hit - request reached the service");
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    let _ = client.get_flag_value("lab-on", None).await;
    if requests.load(Ordering::SeqCst) == before + 1 {
        pass!("Cache entry expired after TTL");
    } else {
        fail!("Cache expiry - no new request after TTL");
    }

    // Test 6: Concurrent lookups
    println!("\nTesting concurrent lookups...");
    let (on, off) = tokio::join!(
        client.get_flag_value("lab-on", Some(&pro)),
        client.get_flag_value("lab-off", Some(&pro)),
    );
    if matches!((on, off), (Ok(true), Ok(false))) {
        pass!("Concurrent lookups resolved independently");
    } else {
        fail!("Concurrent lookups - responses crossed");
    }

    // Test 7: Missing credential
    println!("\nTesting configuration errors...");
    match FlagbookClient::new(FlagbookOptions::default()) {
        Ok(anonymous) => match anonymous.get_flag_value("lab-on", None).await {
            Err(e) if e.is_configuration_error() => pass!("Missing access token rejected"),
            other => fail!(format!("Missing token - expected config error, got {:?}", other)),
        },
        Err(e) => fail!(format!("Missing token client - {}", e)),
    }

    // Test 8: Cleanup
    println!("\nTesting cleanup...");
    client.close();
    client.clear_cache();
    match client.get_flag_value("lab-on", None).await {
        Err(e) if e.is_transport_error() => pass!("close()"),
        other => fail!(format!("close() - expected channel closed, got {:?}", other)),
    }

    print_summary(passed, failed);

    if failed > 0 {
        println!("\n\x1b[31mSome verifications failed!\x1b[0m");
        std::process::exit(1);
    } else {
        println!("\n\x1b[32mAll verifications passed!\x1b[0m");
        std::process::exit(0);
    }
}

async fn start_lab_service(requests: Arc<AtomicUsize>) -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, Arc::clone(&requests)));
        }
    });

    Ok(port)
}

async fn serve(stream: TcpStream, requests: Arc<AtomicUsize>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        if request[0] != "get_flag_value" {
            // Usage traces and anything else need no answer.
            continue;
        }
        requests.fetch_add(1, Ordering::SeqCst);

        let reply = json!([request, evaluate(&request[1], &request[2])]).to_string();
        if ws.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }
}

fn evaluate(name: &Value, tags: &Value) -> Value {
    let tags = tags.as_array().cloned().unwrap_or_default();
    let has_tag = |key: &str, value: &str| tags.iter().any(|tag| tag[0] == key && tag[1] == value);

    match LAB_FLAGS.iter().find(|(flag, _, _)| name.as_str() == Some(*flag)) {
        Some((_, None, value)) => json!(["ok", value]),
        Some((_, Some((key, tag)), value)) => json!(["ok", has_tag(key, tag) && *value]),
        None => json!(["error", format!("unknown flag {}", name)]),
    }
}

fn print_summary(passed: i32, failed: i32) {
    println!("\n{}", "=".repeat(40));
    println!("Results: {} passed, {} failed", passed, failed);
    println!("{}", "=".repeat(40));
}
