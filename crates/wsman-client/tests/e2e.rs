// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::time::Duration;

use anyhow::Result;
use wsman_client::{ClientConfig, ClientError, ErrorKind, Outcome, WsmanClient};
use wsman_core::{BodyFraming, Credentials};
use wsman_testkit::{chunked_ok_response, closed_endpoint, MockAmt, Reply};
use wsman_transport::{SessionConfig, SessionState};

const ENVELOPE: &str = "<a:Envelope><a:Body/></a:Envelope>";

fn admin() -> Credentials {
    Credentials::new("admin", "P@ssw0rd")
}

#[tokio::test]
async fn digest_handshake_against_device() -> Result<()> {
    let settings = "<g:AMT_GeneralSettings><g:HostName>amt-lab</g:HostName></g:AMT_GeneralSettings>";
    let mock = MockAmt::start(vec![
        Reply::digest(admin(), settings),
        Reply::digest(admin(), settings),
    ])
    .await?;
    let client = WsmanClient::connect(mock.endpoint(), admin(), ClientConfig::default()).await?;

    let res = client.send(ENVELOPE).await?;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, settings);
    assert_eq!(res.decode()?["AMT_GeneralSettings"]["HostName"], "amt-lab");

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].authorized, Some(false));
    assert!(requests[0].header("Authorization").is_none());
    assert_eq!(requests[1].authorized, Some(true));
    assert_eq!(requests[1].body_text(), ENVELOPE);
    assert_eq!(mock.connections(), 1);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_auth_failure() -> Result<()> {
    let mock = MockAmt::start(vec![
        Reply::digest(admin(), "<ok/>"),
        Reply::digest(admin(), "<ok/>"),
        Reply::digest(admin(), "<ok/>"),
    ])
    .await?;
    let client = WsmanClient::connect(
        mock.endpoint(),
        Credentials::new("admin", "wrong"),
        ClientConfig::default(),
    )
    .await?;

    let err = client.send(ENVELOPE).await.unwrap_err();
    assert_eq!(err, ClientError::AuthFailed { status: 401 });
    assert_eq!(mock.requests().len(), 2);

    let outcome = Outcome::from(Err(err));
    assert_eq!(
        outcome,
        Outcome::Error {
            error: ErrorKind::AuthFailed,
            detail: "authentication failed (status 401)".into()
        }
    );
    Ok(())
}

#[tokio::test]
async fn chunked_request_and_response() -> Result<()> {
    let body = "<a:Envelope><a:Body><g:PullResponse><g:Items/></g:PullResponse></a:Body></a:Envelope>";
    let mock = MockAmt::start(vec![Reply::Send(chunked_ok_response(body, 10))]).await?;
    let config = ClientConfig {
        framing: BodyFraming::Chunked,
        ..ClientConfig::default()
    };
    let client = WsmanClient::connect(mock.endpoint(), admin(), config).await?;

    let res = client.send(ENVELOPE).await?;
    assert_eq!(res.body, body);

    let requests = mock.requests();
    assert_eq!(requests[0].header("Transfer-Encoding"), Some("chunked"));
    assert_eq!(requests[0].body_text(), ENVELOPE);
    Ok(())
}

#[tokio::test]
async fn reconnects_after_idle_close() -> Result<()> {
    let mock = MockAmt::start(vec![
        Reply::Send(wsman_testkit::ok_response("<first/>")),
        Reply::Send(wsman_testkit::ok_response("<second/>")),
    ])
    .await?;
    let config = ClientConfig {
        session: SessionConfig {
            idle_timeout: Duration::from_millis(150),
            ..SessionConfig::default()
        },
        ..ClientConfig::default()
    };
    let client = WsmanClient::connect(mock.endpoint(), admin(), config).await?;

    assert_eq!(client.send(ENVELOPE).await?.body, "<first/>");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(client.session().state(), SessionState::Closed);

    assert_eq!(client.send(ENVELOPE).await?.body, "<second/>");
    assert_eq!(mock.connections(), 2);
    Ok(())
}

#[tokio::test]
async fn unreachable_device_is_connection_error() -> Result<()> {
    let err = match WsmanClient::connect(closed_endpoint()?, admin(), ClientConfig::default()).await
    {
        Ok(_) => panic!("connect to a closed port succeeded"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::Connection);
    Ok(())
}

#[tokio::test]
async fn disconnect_closes_session() -> Result<()> {
    let mock = MockAmt::start(vec![]).await?;
    let client = WsmanClient::connect(mock.endpoint(), admin(), ClientConfig::default()).await?;
    assert_eq!(client.session().state(), SessionState::Idle);
    client.disconnect().await;
    assert_eq!(client.session().state(), SessionState::Disconnected);
    Ok(())
}
