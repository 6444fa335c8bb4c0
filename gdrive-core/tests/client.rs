use gdrive_core::{
    ApiRequest, DriveClient, DriveError, DriveItem, ErrorSignature, FileList, FileUpload,
    ITEM_FIELDS,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_sends_bearer_token_and_field_projection() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/file-1"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("fields", "id,name,mimeType,parents,md5Checksum"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "file-1",
            "name": "a.jpg",
            "mimeType": "image/jpeg",
            "parents": ["folder-1"],
            "md5Checksum": "abc"
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").expect("client");
    let payload = client
        .execute(&ApiRequest::get("file-1", ITEM_FIELDS))
        .await
        .expect("get succeeds");
    let item: DriveItem = serde_json::from_value(payload).expect("item payload");

    assert_eq!(item.name.as_deref(), Some("a.jpg"));
    assert_eq!(item.parents, vec!["folder-1".to_string()]);
    assert_eq!(item.md5_checksum.as_deref(), Some("abc"));
}

#[tokio::test]
async fn list_passes_query_and_page_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "'folder-1' in parents"))
        .and(query_param("pageSize", "2"))
        .and(query_param("pageToken", "next-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                {"id": "a", "name": "A", "mimeType": "application/vnd.google-apps.folder"},
                {"id": "b", "name": "b.txt", "mimeType": "text/plain", "md5Checksum": "h"}
            ]
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").expect("client");
    let request = ApiRequest::list("'folder-1' in parents", 2, Some("next-1".to_string()));
    let payload = client.execute(&request).await.expect("list succeeds");
    let page: FileList = serde_json::from_value(payload).expect("page payload");

    assert_eq!(page.files.len(), 2);
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn api_error_exposes_status_and_reason() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/file-1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "User Rate Limit Exceeded",
                "errors": [{"domain": "usageLimits", "reason": "userRateLimitExceeded"}]
            }
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").expect("client");
    let err = client
        .execute(&ApiRequest::delete("file-1"))
        .await
        .expect_err("delete is rejected");

    assert_eq!(
        err.signature(),
        Some(ErrorSignature::new("403", Some("userRateLimitExceeded")))
    );
}

#[tokio::test]
async fn delete_accepts_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/file-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").expect("client");
    let payload = client
        .execute(&ApiRequest::delete("file-1"))
        .await
        .expect("delete succeeds");

    assert!(payload.is_null());
}

#[tokio::test]
async fn upload_posts_multipart_related_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(query_param("fields", "id"))
        .and(body_string_contains("\"name\":\"a.jpg\""))
        .and(body_string_contains("payload-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new-1"})))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").expect("client");
    let payload = client
        .execute(&ApiRequest::Create(FileUpload {
            name: "a.jpg".into(),
            parents: vec!["folder-1".into()],
            mime_type: "image/jpeg".into(),
            body: b"payload-bytes".to_vec(),
        }))
        .await
        .expect("upload succeeds");

    assert_eq!(payload["id"], "new-1");
}

#[tokio::test]
async fn execute_batch_maps_replies_back_to_request_ids() {
    let server = MockServer::start().await;

    let body = "--batch_r\r\n\
Content-Type: application/http\r\n\
Content-ID: <response-item-1>\r\n\
\r\n\
HTTP/1.1 404 Not Found\r\n\
Content-Type: application/json; charset=UTF-8\r\n\
\r\n\
{\"error\":{\"code\":404,\"message\":\"File not found: b\",\"errors\":[{\"reason\":\"notFound\"}]}}\r\n\
--batch_r\r\n\
Content-Type: application/http\r\n\
Content-ID: <response-item-0>\r\n\
\r\n\
HTTP/1.1 200 OK\r\n\
Content-Type: application/json; charset=UTF-8\r\n\
\r\n\
{\"id\":\"a\",\"mimeType\":\"text/plain\"}\r\n\
--batch_r--\r\n";

    Mock::given(method("POST"))
        .and(path("/batch/drive/v3"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_string_contains("GET /drive/v3/files/a?fields=id HTTP/1.1"))
        .and(body_string_contains("DELETE /drive/v3/files/b HTTP/1.1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "multipart/mixed; boundary=batch_r"),
        )
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let replies = client
        .execute_batch(&[
            ("get a".to_string(), ApiRequest::get("a", &["id"])),
            ("delete b".to_string(), ApiRequest::delete("b")),
        ])
        .await
        .unwrap();

    assert_eq!(replies.len(), 2);
    let deleted = replies.iter().find(|r| r.id == "delete b").unwrap();
    assert_eq!(
        deleted.result.as_ref().unwrap_err().signature(),
        Some(ErrorSignature::new("404", Some("notFound")))
    );
    let fetched = replies.iter().find(|r| r.id == "get a").unwrap();
    assert_eq!(fetched.result.as_ref().unwrap()["id"], "a");
}

#[tokio::test]
async fn execute_batch_refuses_uploads() {
    let client = DriveClient::with_base_url("http://127.0.0.1:9", "test-token").unwrap();
    let err = client
        .execute_batch(&[(
            "up".to_string(),
            ApiRequest::Create(FileUpload {
                name: "a".into(),
                parents: vec![],
                mime_type: "text/plain".into(),
                body: vec![],
            }),
        )])
        .await
        .unwrap_err();

    assert!(matches!(err, DriveError::Unbatchable(_)));
}

#[tokio::test]
async fn execute_batch_enforces_limit() {
    let client = DriveClient::with_base_url("http://127.0.0.1:9", "test-token").unwrap();
    let requests: Vec<_> = (0..101)
        .map(|i| (i.to_string(), ApiRequest::delete(i.to_string())))
        .collect();
    let err = client.execute_batch(&requests).await.unwrap_err();

    assert!(matches!(err, DriveError::BatchTooLarge(101)));
}
