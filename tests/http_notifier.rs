//! HTTP notifier against a local server.

use std::io::Read;
use std::thread;
use tiny_http::{Response, Server};
use xds_mediator::{
    HttpNotifier, HttpNotifierConfig, MediatorError, Notifier, SubscriptionId, SubscriptionInput,
};

fn local_notifier() -> HttpNotifier {
    HttpNotifier::new(&HttpNotifierConfig {
        timeout_ms: 2_000,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_posts_notify_envelope() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let url = format!("http://{addr}/notify");

    let handle = thread::spawn(move || {
        let mut request = server.recv().unwrap();
        let mut body = String::new();
        request.as_reader().read_to_string(&mut body).unwrap();
        let content_type = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Content-Type"))
            .map(|h| h.value.to_string());
        let path = request.url().to_string();
        let method = request.method().to_string();
        let _ = request.respond(Response::from_string("ok"));
        (method, path, content_type, body)
    });

    let subscription = SubscriptionInput::new(url)
        .with_id(SubscriptionId::from("sub-42"))
        .into_subscription();
    local_notifier().notify(&subscription, "doc123").unwrap();

    let (method, path, content_type, body) = handle.join().unwrap();
    assert_eq!(method, "POST");
    assert_eq!(path, "/notify");
    assert!(content_type.unwrap().starts_with("application/soap+xml"));
    assert!(body.contains("<DocumentId>doc123</DocumentId>"));
    assert!(body.contains("<a:Address>sub-42</a:Address>"));
}

#[test]
fn test_error_status_is_failure() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let url = format!("http://{addr}/notify");

    let handle = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let _ = request.respond(Response::from_string("boom").with_status_code(500));
        }
    });

    let subscription = SubscriptionInput::new(url.clone()).into_subscription();
    let result = local_notifier().notify(&subscription, "doc1");
    handle.join().unwrap();

    match result {
        Err(MediatorError::Notification { url: failed, reason }) => {
            assert_eq!(failed, url);
            assert!(reason.contains("500"));
        }
        other => panic!("expected notification failure, got {:?}", other),
    }
}

#[test]
fn test_unreachable_subscriber_is_failure() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let server = Server::http("127.0.0.1:0").unwrap();
        server.server_addr().to_ip().unwrap().port()
    };

    let subscription =
        SubscriptionInput::new(format!("http://127.0.0.1:{port}/notify")).into_subscription();
    let result = local_notifier().notify(&subscription, "doc1");
    assert!(matches!(result, Err(MediatorError::Notification { .. })));
}
