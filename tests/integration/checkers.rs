//! Built-in checkers obtained through the registry

use std::time::Duration;

use assert_matches::assert_matches;
use checkmate::checkers::{
    CheckOptions, CheckerRegistry, ProbeContext, ProbeError, Protocol, RegistryError,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::closed_port;

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}

#[tokio::test]
async fn test_tcp_mixed_hosts_keep_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((_socket, _)) = listener.accept().await {}
    });

    let checker = CheckerRegistry::with_defaults().get("tcp").unwrap();
    let results = checker
        .check(
            &ProbeContext::default(),
            &hosts(&["256.0.0.1", "127.0.0.1"]),
            port,
        )
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].host, "256.0.0.1");
    assert!(!results[0].result.success);
    assert_eq!(results[1].host, "127.0.0.1");
    assert!(results[1].result.success);
}

#[tokio::test]
async fn test_http_checker_against_mock_server() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let port = mock_server.address().port();
    let checker = CheckerRegistry::with_defaults().get(Protocol::HTTP).unwrap();
    let results = checker
        .check(&ProbeContext::default(), &hosts(&["127.0.0.1"]), port)
        .await;

    assert_eq!(results[0].result.error, Some(ProbeError::Status(503)));
}

#[tokio::test]
async fn test_smtp_checker_against_fake_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"220 mail.test ESMTP\r\n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply: &[u8] = if line.starts_with("EHLO") {
                b"250-mail.test\r\n250 SIZE 1000\r\n"
            } else if line.starts_with("QUIT") {
                b"221 bye\r\n"
            } else {
                b"500 unknown\r\n"
            };
            write.write_all(reply).await.unwrap();
        }
    });

    let checker = CheckerRegistry::with_defaults().get("SMTP").unwrap();
    let results = checker
        .check(&ProbeContext::default(), &hosts(&["127.0.0.1"]), port)
        .await;

    assert!(results[0].result.success, "{:?}", results[0].result.error);
}

#[tokio::test]
async fn test_dns_checker_reports_addresses() {
    let checker = CheckerRegistry::with_defaults().get("dns").unwrap();
    let results = checker
        .check(&ProbeContext::default(), &hosts(&["127.0.0.1"]), 0)
        .await;

    assert!(results[0].result.success);
    assert_eq!(
        results[0].result.addresses(),
        Some(&["127.0.0.1".parse().unwrap()][..])
    );
}

#[tokio::test]
async fn test_each_protocol_clamps_to_its_own_bounds() {
    let registry = CheckerRegistry::with_defaults();
    let cases = [
        ("TCP", Duration::from_secs(10)),
        ("HTTP", Duration::from_secs(20)),
        ("HTTPS", Duration::from_secs(20)),
        ("SMTP", Duration::from_secs(15)),
        ("DNS", Duration::from_secs(5)),
    ];

    for (protocol, max) in cases {
        let mut checker = registry.get(protocol).unwrap();
        assert!(checker.set_timeout(Duration::from_secs(300)).is_err());
        assert_eq!(checker.timeout(), max, "{protocol}");
    }
}

#[tokio::test]
async fn test_https_configure_accepts_verification_flag() {
    let mut checker = CheckerRegistry::with_defaults().get("https").unwrap();
    checker
        .configure(&CheckOptions { verify_cert: true })
        .unwrap();

    let port = closed_port().await;
    let results = checker
        .check(&ProbeContext::default(), &hosts(&["127.0.0.1"]), port)
        .await;
    assert_matches!(results[0].result.error, Some(ProbeError::Request(_)));
}

#[tokio::test]
async fn test_cancelled_context_short_circuits_builtin_checkers() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = ProbeContext::new(cancel);

    let checker = CheckerRegistry::with_defaults().get("tcp").unwrap();
    let results = checker
        .check(&ctx, &hosts(&["127.0.0.1", "127.0.0.2"]), 9)
        .await;

    assert!(
        results
            .iter()
            .all(|r| r.result.error == Some(ProbeError::Cancelled))
    );
}

#[test]
fn test_unknown_protocol_is_reported() {
    let err = CheckerRegistry::with_defaults().get("gopher").err().unwrap();
    assert_matches!(err, RegistryError::UnknownProtocol { .. });
    assert_eq!(
        err.to_string(),
        "no checker registered for protocol: GOPHER (valid protocols: DNS, HTTP, HTTPS, SMTP, TCP)"
    );
}
