use async_trait::async_trait;
use bytes::Bytes;
use cidrelay_cli::{routes, AppState, RelayConfig};
use cidrelay_resolver::{
    ClientConfig, FolderEntry, Gateway, LocalNode, RegistryConfig, ResolverError, Result,
    Visibility,
};
use reqwest::{multipart, Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Local node with canned listings that records uploads and announcements
#[derive(Default)]
struct StubNode {
    listings: HashMap<&'static str, &'static str>,
    added: Mutex<Vec<(String, Visibility)>>,
    folders: Mutex<Vec<(Vec<String>, Visibility)>>,
    provided: Mutex<Vec<String>>,
}

#[async_trait]
impl LocalNode for StubNode {
    async fn ls(&self, cid: &str) -> Result<String> {
        self.listings
            .get(cid)
            .map(|s| s.to_string())
            .ok_or_else(|| ResolverError::LocalNode(format!("{cid} is not a directory")))
    }

    async fn cumulative_size(&self, _cid: &str) -> Result<u64> {
        Ok(4096)
    }

    async fn resolve_path(&self, path: &str) -> Result<String> {
        Err(ResolverError::LocalNode(format!("cannot resolve {path}")))
    }

    async fn add(&self, data: Bytes, filename: &str, visibility: Visibility) -> Result<String> {
        assert!(!data.is_empty());
        self.added.lock().unwrap().push((filename.to_string(), visibility));
        Ok("QmUploaded".to_string())
    }

    async fn add_folder(&self, files: Vec<FolderEntry>, visibility: Visibility) -> Result<String> {
        let paths = files.into_iter().map(|f| f.path).collect();
        self.folders.lock().unwrap().push((paths, visibility));
        Ok("QmFolder".to_string())
    }

    async fn cat(&self, cid: &str, visibility: Visibility) -> Result<Bytes> {
        assert_eq!(visibility, Visibility::Private);
        match cid {
            "QmPrivatePng" => Ok(Bytes::from_static(PNG_BYTES)),
            "QmSlow" => Err(ResolverError::Timeout("ipfs cat after 120s".to_string())),
            other => Err(ResolverError::LocalNode(format!("{other}: block not found"))),
        }
    }

    async fn provide(&self, cid: &str) -> Result<()> {
        self.provided.lock().unwrap().push(cid.to_string());
        Ok(())
    }
}

struct TestRelay {
    base_url: String,
    primary: MockServer,
    fallback: MockServer,
    node: Arc<StubNode>,
    client: Client,
}

impl TestRelay {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// Helper to spawn the relay on a random port in front of two mock gateways
async fn spawn_relay() -> TestRelay {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;

    let mut node = StubNode::default();
    node.listings.insert("QmDir", "1024 QmAbc file.txt\n2048 QmSub sub/\n");
    node.listings.insert("QmSub", "5 QmInner inner.txt\n");
    let node = Arc::new(node);

    let config = RelayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        registry: RegistryConfig {
            gateways: vec![
                Gateway::new("mock_a", format!("{}/ipfs/", primary.uri())),
                Gateway::new("mock_b", format!("{}/ipfs/", fallback.uri())),
            ],
            primary: "mock_a".to_string(),
            fallbacks: vec!["mock_b".to_string()],
        },
        client: ClientConfig::default()
            .with_uniform_timeout(5)
            .with_transport_retries(0),
        ..Default::default()
    };

    let local_node: Arc<dyn LocalNode> = node.clone();
    let state = Arc::new(AppState::with_node(config, local_node).unwrap());
    let app = routes::create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestRelay {
        base_url: format!("http://{}", addr),
        primary,
        fallback,
        node,
        client: Client::new(),
    }
}

async fn serve(server: &MockServer, verb: &str, cid: &str, response: ResponseTemplate) {
    Mock::given(method(verb))
        .and(path(format!("/ipfs/{}", cid)))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_check() {
    let relay = spawn_relay().await;
    let res = relay.client.head(relay.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_gateway_switching() {
    let relay = spawn_relay().await;

    let body: Value = relay
        .client
        .get(relay.url("/gateway"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["current_gateway"], "mock_a");
    assert!(body["available_gateways"]["mock_b"].is_string());

    let res = relay
        .client
        .post(relay.url("/gateway"))
        .json(&serde_json::json!({ "gateway": "mock_b" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Gateway switched to mock_b");

    // Unknown names are rejected and leave the primary alone
    let res = relay
        .client
        .post(relay.url("/gateway"))
        .json(&serde_json::json!({ "gateway": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["available"], serde_json::json!(["mock_a", "mock_b"]));

    let body: Value = relay
        .client
        .get(relay.url("/gateway"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["current_gateway"], "mock_b");
}

#[tokio::test]
async fn test_metadata_is_cached() {
    let relay = spawn_relay().await;
    serve(
        &relay.primary,
        "HEAD",
        "QmImage",
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .insert_header("content-length", "4096"),
    )
    .await;

    for _ in 0..2 {
        let res = relay
            .client
            .get(relay.url("/metadata?cid=QmImage"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["cid"], "QmImage");
        assert_eq!(body["type"], "image/png");
        assert_eq!(body["size"], 4096);
        assert_eq!(body["is_dir"], false);
        assert_eq!(body["source"]["name"], "mock_a");
    }

    assert_eq!(relay.primary.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_metadata_requires_cid() {
    let relay = spawn_relay().await;
    let res = relay.client.get(relay.url("/metadata")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Missing CID");
}

#[tokio::test]
async fn test_list_from_local_node() {
    let relay = spawn_relay().await;

    let res = relay.client.get(relay.url("/ls?cid=QmDir")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["method"], "local_node");
    assert_eq!(body["total_items"], 2);
    assert_eq!(body["is_directory"], true);
    assert!(body.get("gateway_used").is_none());

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries[0]["name"], "file.txt");
    assert_eq!(entries[0]["size_human"], "1.0 KB");
    assert_eq!(entries[0]["preview_type"], "text");
    assert_eq!(entries[0]["parent_cid"], "QmDir");
    assert_eq!(entries[1]["size_human"], "2.0 KB");
    assert_eq!(entries[1]["is_directory"], true);
    assert_eq!(entries[1]["type"], "directory");
}

#[tokio::test]
async fn test_list_from_gateway_html() {
    let relay = spawn_relay().await;
    serve(
        &relay.primary,
        "GET",
        "QmRemote",
        ResponseTemplate::new(200).set_body_raw(
            r#"<a href="/ipfs/QmXyz">image.png</a><a href="/ipfs/QmPar">..</a>"#,
            "text/html",
        ),
    )
    .await;

    let body: Value = relay
        .client
        .get(relay.url("/ls?cid=QmRemote"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["method"], "gateway_html");
    assert_eq!(body["gateway_used"], "mock_a");
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["entries"][0]["name"], "image.png");
    assert_eq!(body["entries"][0]["preview_type"], "image");
}

#[tokio::test]
async fn test_list_rejects_files() {
    let relay = spawn_relay().await;
    serve(
        &relay.primary,
        "GET",
        "QmFile",
        ResponseTemplate::new(200).set_body_raw("plain", "text/plain"),
    )
    .await;

    let res = relay.client.get(relay.url("/ls?cid=QmFile")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Could not list directory contents");
}

#[tokio::test]
async fn test_preview_streams_from_fallback() {
    let relay = spawn_relay().await;
    let payload = vec![7u8; 20_000];
    serve(&relay.primary, "GET", "QmBig", ResponseTemplate::new(502)).await;
    serve(
        &relay.fallback,
        "GET",
        "QmBig",
        ResponseTemplate::new(200).set_body_raw(payload.clone(), "application/octet-stream"),
    )
    .await;

    let res = relay.client.get(relay.url("/preview?cid=QmBig")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-gateway-used"], "mock_b");
    assert_eq!(res.headers()["cache-control"], "public, max-age=3600");
    assert!(res.headers().get("content-disposition").is_none());

    let body = res.bytes().await.unwrap();
    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn test_preview_file_guesses_type_from_name() {
    let relay = spawn_relay().await;
    serve(
        &relay.primary,
        "GET",
        "QmPhoto",
        ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "application/octet-stream"),
    )
    .await;

    let res = relay
        .client
        .get(relay.url("/preview-file?file_cid=QmPhoto&parent_cid=QmDir&filename=photo.png"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/png");
    assert_eq!(res.headers()["x-parent-cid"], "QmDir");
    assert_eq!(res.headers()["x-filename"], "photo.png");
}

#[tokio::test]
async fn test_download_and_content_dispositions() {
    let relay = spawn_relay().await;
    serve(
        &relay.primary,
        "GET",
        "QmPdf",
        ResponseTemplate::new(200).set_body_raw("%PDF-1.7", "application/pdf"),
    )
    .await;
    serve(
        &relay.primary,
        "GET",
        "QmZip",
        ResponseTemplate::new(200).set_body_raw(vec![0x50u8, 0x4b], "application/zip"),
    )
    .await;

    let res = relay.client.get(relay.url("/download?cid=QmPdf")).send().await.unwrap();
    assert_eq!(
        res.headers()["content-disposition"],
        "attachment; filename=\"QmPdf.pdf\""
    );

    let res = relay
        .client
        .get(relay.url("/download?cid=QmPdf&filename=report.pdf"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers()["content-disposition"],
        "attachment; filename=\"report.pdf\""
    );

    let res = relay.client.get(relay.url("/content?cid=QmPdf")).send().await.unwrap();
    assert!(res.headers().get("content-disposition").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), b"%PDF-1.7");

    let res = relay
        .client
        .get(relay.url("/content?cid=QmZip&filename=bundle.zip"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers()["content-disposition"],
        "attachment; filename=\"bundle.zip\""
    );
}

#[tokio::test]
async fn test_all_gateways_failed_is_unavailable() {
    let relay = spawn_relay().await;
    serve(&relay.primary, "GET", "QmGone", ResponseTemplate::new(404)).await;
    serve(&relay.fallback, "GET", "QmGone", ResponseTemplate::new(500)).await;

    let res = relay.client.get(relay.url("/preview?cid=QmGone")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("QmGone"));
}

#[tokio::test]
async fn test_fetch_text() {
    let relay = spawn_relay().await;
    serve(
        &relay.primary,
        "HEAD",
        "QmNote",
        ResponseTemplate::new(200).insert_header("content-type", "text/plain"),
    )
    .await;
    serve(
        &relay.primary,
        "GET",
        "QmNote",
        ResponseTemplate::new(200).set_body_raw("hello relay", "text/plain"),
    )
    .await;

    let body: Value = relay
        .client
        .get(relay.url("/fetch/QmNote"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["type"], "text/plain");
    assert_eq!(body["text"], "hello relay");
    assert_eq!(body["gateway_used"], "mock_a");
}

#[tokio::test]
async fn test_navigate_falls_back_to_listing() {
    let relay = spawn_relay().await;

    let res = relay
        .client
        .get(relay.url("/navigate?parent=QmDir&name=file.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["file_cid"], "QmAbc");
    assert_eq!(body["method"], "ls_lookup");
    assert_eq!(body["full_path"], "QmDir/file.txt");

    let res = relay
        .client
        .get(relay.url("/navigate?parent=QmDir&name=missing.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = relay.client.get(relay.url("/navigate?parent=QmDir")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_public_upload_is_announced() {
    let relay = spawn_relay().await;

    let form = multipart::Form::new()
        .part(
            "file",
            multipart::Part::bytes(b"hello ipfs".to_vec()).file_name("hello.txt"),
        )
        .text("visibility", "public");
    let res = relay
        .client
        .post(relay.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["cid"], "QmUploaded");
    assert_eq!(body["visibility"], "public");

    for _ in 0..100 {
        if !relay.node.provided.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*relay.node.provided.lock().unwrap(), vec!["QmUploaded".to_string()]);
}

#[tokio::test]
async fn test_private_upload_is_not_announced() {
    let relay = spawn_relay().await;

    let form = multipart::Form::new()
        .part("file", multipart::Part::bytes(b"secret".to_vec()).file_name("notes.md"))
        .text("visibility", "private");
    let res = relay
        .client
        .post(relay.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(relay.node.provided.lock().unwrap().is_empty());
    assert_eq!(
        *relay.node.added.lock().unwrap(),
        vec![("notes.md".to_string(), Visibility::Private)]
    );
}

#[tokio::test]
async fn test_upload_without_file() {
    let relay = spawn_relay().await;

    let form = multipart::Form::new().text("visibility", "public");
    let res = relay
        .client
        .post(relay.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "No file provided");
}

#[tokio::test]
async fn test_folder_upload_keeps_structure() {
    let relay = spawn_relay().await;

    let form = multipart::Form::new()
        .part("files", multipart::Part::bytes(b"png".to_vec()).file_name("a.png"))
        .part("files", multipart::Part::bytes(b"skipped".to_vec()))
        .part("files", multipart::Part::bytes(b"hello".to_vec()).file_name("b.txt"))
        .text("paths_0", "photos/a.png")
        .text("paths_2", "photos/../notes/b.txt")
        .text("visibility", "public");
    let res = relay
        .client
        .post(relay.url("/upload-folder"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["folderCid"], "QmFolder");
    assert_eq!(body["folderName"], "photos");
    assert_eq!(body["fileCount"], 2);
    assert_eq!(body["totalSize"], 8);
    assert_eq!(body["files"][0]["path"], "photos/a.png");
    assert_eq!(body["files"][0]["type"], "image/png");
    assert_eq!(body["files"][1]["path"], "photos/notes/b.txt");

    assert_eq!(
        *relay.node.folders.lock().unwrap(),
        vec![(
            vec!["photos/a.png".to_string(), "photos/notes/b.txt".to_string()],
            Visibility::Public
        )]
    );

    for _ in 0..100 {
        if !relay.node.provided.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*relay.node.provided.lock().unwrap(), vec!["QmFolder".to_string()]);
}

#[tokio::test]
async fn test_private_folder_upload_is_not_announced() {
    let relay = spawn_relay().await;

    let form = multipart::Form::new()
        .part("files", multipart::Part::bytes(b"x".to_vec()).file_name("solo.txt"))
        .text("visibility", "private");
    let res = relay
        .client
        .post(relay.url("/upload-folder"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["visibility"], "private");
    assert!(body["folderName"]
        .as_str()
        .unwrap()
        .starts_with("uploaded_folder_"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(relay.node.provided.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_folder_upload_rejects_missing_files() {
    let relay = spawn_relay().await;

    let form = multipart::Form::new().text("visibility", "public");
    let res = relay
        .client
        .post(relay.url("/upload-folder"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "No files provided");

    let form = multipart::Form::new().part("files", multipart::Part::bytes(b"x".to_vec()));
    let res = relay
        .client
        .post(relay.url("/upload-folder"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "No files selected");
}

#[tokio::test]
async fn test_preview_private_sniffs_type() {
    let relay = spawn_relay().await;

    let res = relay
        .client
        .get(relay.url("/preview-private/QmPrivatePng"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/png");
    assert_eq!(
        res.headers()["content-disposition"],
        "inline; filename=\"QmPrivatePng.png\""
    );
    assert_eq!(&res.bytes().await.unwrap()[..], PNG_BYTES);

    // Private reads never go through the gateways
    assert!(relay.primary.received_requests().await.unwrap().is_empty());
    assert!(relay.fallback.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_preview_private_failures() {
    let relay = spawn_relay().await;

    let res = relay
        .client
        .get(relay.url("/preview-private/QmSlow"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Request timeout - content too large or not available");

    let res = relay
        .client
        .get(relay.url("/preview-private/QmMissing"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Failed to read private CID");
    assert!(body["details"].as_str().unwrap().contains("block not found"));
}
