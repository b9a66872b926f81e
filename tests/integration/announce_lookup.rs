use crate::*;

#[tokio::test]
async fn test_lookup_unknown_service_is_empty() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;

    let mut client = WsClient::connect(ws_addr(&a).await?).await?;
    let peers = client.request("lookup", json!("rest:util:net")).await?;
    assert_eq!(peers, json!([]));

    a.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_announce_visible_from_other_node() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let b = spawn_node(&net, 20002, &[20001], LONG_WINDOW_MS).await?;

    let mut client_a = WsClient::connect(ws_addr(&a).await?).await?;
    let mut client_b = WsClient::connect(ws_addr(&b).await?).await?;

    let ack = client_a
        .request("announce", json!(["rest:util:net", 1337]))
        .await?;
    assert_eq!(ack, Value::Null);

    let peers = client_b.request("lookup", json!("rest:util:net")).await?;
    assert_eq!(peers, json!(["127.0.0.1:1337"]));

    // Same answer over HTTP.
    let peers = http_request(http_addr(&b).await?, "lookup", json!("rest:util:net")).await?;
    assert_eq!(peers, json!(["127.0.0.1:1337"]));

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_announce_without_port_uses_dht_port() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let b = spawn_node(&net, 20002, &[20001], LONG_WINDOW_MS).await?;

    let mut client_a = WsClient::connect(ws_addr(&a).await?).await?;
    client_a.request("announce", json!(["svc"])).await?;
    client_a.request("announce", json!(["svc2", null])).await?;
    client_a.request("announce", json!(["svc3", 0])).await?;

    let mut client_b = WsClient::connect(ws_addr(&b).await?).await?;
    assert_eq!(
        client_b.request("lookup", json!("svc")).await?,
        json!(["127.0.0.1:20001"])
    );
    assert_eq!(
        client_b.request("lookup", json!("svc2")).await?,
        json!(["127.0.0.1:20001"])
    );
    assert_eq!(
        client_b.request("lookup", json!("svc3")).await?,
        json!(["127.0.0.1:20001"])
    );

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_multiple_providers_are_merged() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let b = spawn_node(&net, 20002, &[20001], LONG_WINDOW_MS).await?;
    let c = spawn_node(&net, 20003, &[20002], LONG_WINDOW_MS).await?;

    let mut client_a = WsClient::connect(ws_addr(&a).await?).await?;
    client_a.request("announce", json!(["svc", 9001])).await?;
    client_a.request("announce", json!(["svc", 9000])).await?;
    client_a.request("announce", json!(["svc", 9000])).await?;

    // C only knows B; A is reached through it.
    let mut client_c = WsClient::connect(ws_addr(&c).await?).await?;
    assert_eq!(
        client_c.request("lookup", json!("svc")).await?,
        json!(["127.0.0.1:9000", "127.0.0.1:9001"])
    );

    for node in [a, b, c] {
        node.stop().await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_announce_expires_after_two_windows() -> Result<()> {
    const WINDOW_MS: u64 = 200;

    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], WINDOW_MS).await?;
    let b = spawn_node(&net, 20002, &[20001], WINDOW_MS).await?;

    let mut client_a = WsClient::connect(ws_addr(&a).await?).await?;
    let mut client_b = WsClient::connect(ws_addr(&b).await?).await?;

    client_a.request("announce", json!(["svc", 1337])).await?;
    assert_eq!(
        client_b.request("lookup", json!("svc")).await?,
        json!(["127.0.0.1:1337"])
    );

    tokio::time::sleep(Duration::from_millis(WINDOW_MS * 3)).await;
    assert_eq!(client_b.request("lookup", json!("svc")).await?, json!([]));

    // Announcing again brings it back.
    client_a.request("announce", json!(["svc", 1337])).await?;
    assert_eq!(
        client_b.request("lookup", json!("svc")).await?,
        json!(["127.0.0.1:1337"])
    );

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_stopped_node_leaves_overlay() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let b = spawn_node(&net, 20002, &[20001], LONG_WINDOW_MS).await?;

    let mut client_a = WsClient::connect(ws_addr(&a).await?).await?;
    client_a.request("announce", json!(["svc", 1337])).await?;
    drop(client_a);
    a.stop().await?;

    // Only B remains; B held a copy of A's announce.
    let mut client_b = WsClient::connect(ws_addr(&b).await?).await?;
    assert_eq!(
        client_b.request("lookup", json!("svc")).await?,
        json!(["127.0.0.1:1337"])
    );

    b.stop().await?;
    Ok(())
}
