use crate::*;
use beacond::{NodeError, NodeState};

#[tokio::test]
async fn test_stop_closes_transports() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let ws = ws_addr(&a).await?;
    let http = http_addr(&a).await?;

    a.stop().await?;
    assert_eq!(a.state(), NodeState::Stopped);
    assert!(net.is_empty());

    assert!(WsClient::connect(ws).await.is_err());
    assert!(http_request(http, "lookup", json!("svc")).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_stop_closes_open_ws_connections() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let mut client = WsClient::connect(ws_addr(&a).await?).await?;
    assert_eq!(client.request("lookup", json!("svc")).await?, json!([]));

    tokio::time::timeout(Duration::from_secs(5), a.stop())
        .await
        .context("stop hung on an open connection")??;
    assert_eq!(a.state(), NodeState::Stopped);

    // The server sent Close; the connection no longer answers.
    assert!(client.request("lookup", json!("svc")).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_busy_http_port_fails_start_and_frees_dht() -> Result<()> {
    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let busy = blocker.local_addr()?.port();

    let net = LocalNetwork::new();
    let mut config = node_config(20001, &[], LONG_WINDOW_MS);
    config.api_port_http = Some(busy);
    let node = Node::new(config, Arc::new(net.clone()));

    let err = node.start().await.err().context("start should fail")?;
    assert!(matches!(err, NodeError::Transport(_)));
    assert_eq!(node.state(), NodeState::Stopped);
    assert!(net.is_empty());

    // The DHT port is free again.
    let again = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    again.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_restart_serves_again() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    a.stop().await?;
    a.start().await?;

    let mut client = WsClient::connect(ws_addr(&a).await?).await?;
    assert_eq!(client.request("lookup", json!("svc")).await?, json!([]));

    a.stop().await?;
    Ok(())
}
