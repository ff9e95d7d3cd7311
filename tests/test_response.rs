use citadel::http::buffer::WriteBuffer;
use citadel::http::response::{EMPTY_PAGE, ResponseBuilder, StatusCode};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::InternalError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::BadRequest.reason_phrase(), "Bad Request");
    assert_eq!(StatusCode::Forbidden.reason_phrase(), "Forbidden");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(StatusCode::InternalError.reason_phrase(), "Internal Error");
}

#[test]
fn test_status_code_canned_bodies() {
    assert_eq!(
        StatusCode::BadRequest.canned_body(),
        "Your request has bad syntax or is inherently impossible to satisfy."
    );
    assert_eq!(
        StatusCode::Forbidden.canned_body(),
        "You do not have permission to get file from this server."
    );
    assert_eq!(
        StatusCode::NotFound.canned_body(),
        "The requested file was not found on this server."
    );
    assert_eq!(
        StatusCode::InternalError.canned_body(),
        "There was an unusual problem serving the request file."
    );
}

#[test]
fn test_error_response_layout() {
    let mut buf = WriteBuffer::new(1024);
    ResponseBuilder::new(&mut buf)
        .error(StatusCode::NotFound, false)
        .unwrap();

    let body = StatusCode::NotFound.canned_body();
    let expected = format!(
        "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    assert_eq!(buf.staged(), expected.as_bytes());
}

#[test]
fn test_error_response_keep_alive_header() {
    let mut buf = WriteBuffer::new(1024);
    ResponseBuilder::new(&mut buf)
        .error(StatusCode::BadRequest, true)
        .unwrap();

    let text = String::from_utf8(buf.staged().to_vec()).unwrap();
    assert!(text.contains("Connection: keep-alive\r\n"));
}

#[test]
fn test_file_response_head_carries_no_body_bytes() {
    let mut buf = WriteBuffer::new(1024);
    ResponseBuilder::new(&mut buf).file(1234, true).unwrap();

    let text = String::from_utf8(buf.staged().to_vec()).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Length: 1234\r\n"));
    assert!(text.contains("Connection: keep-alive\r\n"));
    // The head ends at the blank line; the file itself is a separate fragment.
    assert!(text.ends_with("\r\n\r\n"));
}

#[test]
fn test_zero_length_file_gets_the_stub_body() {
    let mut buf = WriteBuffer::new(1024);
    ResponseBuilder::new(&mut buf).file(0, false).unwrap();

    let text = String::from_utf8(buf.staged().to_vec()).unwrap();
    assert!(text.ends_with(EMPTY_PAGE));
    assert!(text.contains(&format!("Content-Length: {}\r\n", EMPTY_PAGE.len())));
}

#[test]
fn test_response_that_does_not_fit_reports_failure() {
    let mut buf = WriteBuffer::new(8);
    assert!(ResponseBuilder::new(&mut buf)
        .error(StatusCode::InternalError, false)
        .is_err());
}
