use crate::*;

#[tokio::test]
async fn test_ws_error_codes() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let mut client = WsClient::connect(ws_addr(&a).await?).await?;

    assert_eq!(client.request("frobnicate", json!("x")).await?, "ERR_REQ_NOTFOUND");
    assert_eq!(client.request("lookup", Value::Null).await?, "ERR_LOOKUP");
    assert_eq!(client.request("announce", json!("svc")).await?, "ERR_ANNOUNCE");
    assert_eq!(
        client.request("announce", json!(["svc", "not-a-number"])).await?,
        "ERR_SERVICE_PORT"
    );
    assert_eq!(client.request("get", json!("zz")).await?, "ERR_HASH_FORMAT");
    assert_eq!(client.request("put", json!(["v"])).await?, "ERR_GENERIC");

    a.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_ws_rid_is_echoed_verbatim() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let mut client = WsClient::connect(ws_addr(&a).await?).await?;

    let rid = json!({ "n": 42 });
    client
        .send_raw(&json!([rid, "lookup", "svc"]).to_string())
        .await?;
    assert_eq!(client.reply_for(&rid).await?, json!([]));

    a.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_ws_malformed_frame_is_dropped() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let mut client = WsClient::connect(ws_addr(&a).await?).await?;

    client.send_raw("this is not json").await?;
    client.send_raw(r#"{"rid":1}"#).await?;

    // The connection survives and the next request is answered.
    assert_eq!(client.request("lookup", json!("svc")).await?, json!([]));

    a.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_ws_requests_are_concurrent() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let mut client = WsClient::connect(ws_addr(&a).await?).await?;

    for i in 0..8 {
        client
            .send_raw(&json!([i, "announce", [format!("svc-{i}"), 1000 + i]]).to_string())
            .await?;
    }
    // Replies may arrive in any order.
    let mut rids = Vec::new();
    for _ in 0..8 {
        let (rid, body) = client.next_reply().await?;
        assert_eq!(body, Value::Null);
        rids.push(rid.as_u64().context("numeric rid")?);
    }
    rids.sort_unstable();
    assert_eq!(rids, (0..8).collect::<Vec<u64>>());

    let mut other = WsClient::connect(ws_addr(&a).await?).await?;
    assert_eq!(other.request("lookup", json!("svc-7")).await?, json!(["127.0.0.1:1007"]));

    a.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_put_get_roundtrip() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let b = spawn_node(&net, 20002, &[20001], LONG_WINDOW_MS).await?;

    let mut client_a = WsClient::connect(ws_addr(&a).await?).await?;
    let id = client_a.request("put", json!({ "v": "hello world" })).await?;
    let id = id.as_str().context("put should return an item id")?.to_string();
    assert_eq!(id.len(), 40);

    let item = http_request(http_addr(&b).await?, "get", json!(id)).await?;
    assert_eq!(item, json!({ "id": id, "v": "hello world" }));

    let missing = http_request(http_addr(&b).await?, "get", json!("00".repeat(20))).await?;
    assert_eq!(missing, Value::Null);

    a.stop().await?;
    b.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_http_error_codes() -> Result<()> {
    let net = LocalNetwork::new();
    let a = spawn_node(&net, 20001, &[], LONG_WINDOW_MS).await?;
    let addr = http_addr(&a).await?;

    assert_eq!(http_request(addr, "nope", json!(1)).await?, "ERR_REQ_NOTFOUND");
    assert_eq!(
        http_request(addr, "announce", json!(["svc", 70000])).await?,
        "ERR_SERVICE_PORT"
    );

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/lookup"))
        .body("not json")
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    for path in ["/", "/lookup/extra"] {
        let body: Value = reqwest::Client::new()
            .post(format!("http://{addr}{path}"))
            .json(&json!({ "rid": "h1", "data": "svc" }))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(body, "ERR_REQ_NOTFOUND", "POST {path}");
    }

    a.stop().await?;
    Ok(())
}
