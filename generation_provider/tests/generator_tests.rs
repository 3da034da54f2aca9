use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use generation_provider::config::OLLAMA_DEFAULTS;
use generation_provider::generator::{Generator, GeneratorError, OllamaConfig, OllamaGenerator};

/// Serve exactly one HTTP request with `status` and `body`, handing back the request body.
fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream);
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read header");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
        }
        let mut request_body = vec![0u8; content_length];
        reader.read_exact(&mut request_body).expect("read body");

        let mut stream = reader.into_inner();
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).expect("write response");
        String::from_utf8(request_body).expect("utf8 body")
    });
    (format!("http://{addr}"), handle)
}

fn config_for(endpoint: String) -> OllamaConfig {
    OllamaConfig { endpoint, timeout: Duration::from_secs(5), ..OllamaConfig::default() }
}

#[test]
fn defaults_point_at_local_server() {
    let config = OllamaConfig::default();
    assert_eq!(config.endpoint, OLLAMA_DEFAULTS.endpoint);
    assert_eq!(config.model, OLLAMA_DEFAULTS.model);
}

#[test]
fn generate_posts_prompt_and_token_budget() {
    let (endpoint, server) = serve_once("200 OK", r#"{"response":"Validation shows the system meets its specification.","done":true}"#);
    let generator = OllamaGenerator::new(config_for(format!("{endpoint}/"))).expect("valid config");

    let answer = generator.generate("QUESTION: What is validation?", 120).expect("generation succeeds");
    assert_eq!(answer, "Validation shows the system meets its specification.");

    let request: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    assert_eq!(request["prompt"], "QUESTION: What is validation?");
    assert_eq!(request["stream"], false);
    assert_eq!(request["options"]["num_predict"], 120);
    assert_eq!(request["model"], OLLAMA_DEFAULTS.model);
}

#[test]
fn http_errors_keep_status_and_body() {
    let (endpoint, server) = serve_once("404 Not Found", r#"{"error":"model not found"}"#);
    let generator = OllamaGenerator::new(config_for(endpoint)).unwrap();

    let err = generator.generate("prompt", 10).expect_err("404 must fail");
    server.join().unwrap();
    assert_eq!(err, GeneratorError::Http { status: 404, body: r#"{"error":"model not found"}"#.into() });
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let generator = OllamaGenerator::new(config_for(endpoint)).unwrap();
    let err = generator.generate("prompt", 10).expect_err("nothing is listening");
    assert!(matches!(err, GeneratorError::Transport { .. }), "{err:?}");
}

#[test]
fn empty_model_or_endpoint_is_rejected() {
    let mut config = OllamaConfig::default();
    config.model = "  ".into();
    assert!(matches!(OllamaGenerator::new(config), Err(GeneratorError::InvalidConfiguration { .. })));

    let config = OllamaConfig { endpoint: "/".into(), ..OllamaConfig::default() };
    assert!(matches!(OllamaGenerator::new(config), Err(GeneratorError::InvalidConfiguration { .. })));
}
