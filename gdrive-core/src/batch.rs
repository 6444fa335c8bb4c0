//! Encoding and decoding of `multipart/mixed` batch calls.
//!
//! Every sub-request is tagged with a `Content-ID` of `item-<n>`, where `n` is
//! its position in the submitted slice. The service answers with
//! `response-item-<n>`, which is how replies are matched back to requests.

use std::fmt::Write;

use reqwest::StatusCode;

use crate::client::DriveError;

const CONTENT_ID_PREFIX: &str = "item-";

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BatchPart {
    pub index: usize,
    pub status: StatusCode,
    pub body: String,
}

pub(crate) fn encode(request_lines: &[String], boundary: &str) -> String {
    let mut body = String::new();
    for (index, line) in request_lines.iter().enumerate() {
        let _ = write!(
            body,
            "--{boundary}\r\nContent-Type: application/http\r\nContent-ID: <{CONTENT_ID_PREFIX}{index}>\r\n\r\n{line}\r\n\r\n"
        );
    }
    let _ = write!(body, "--{boundary}--\r\n");
    body
}

pub(crate) fn decode(content_type: &str, body: &str) -> Result<Vec<BatchPart>, DriveError> {
    let boundary = boundary_param(content_type).ok_or_else(|| {
        DriveError::MalformedBatch(format!("no boundary in content type {content_type:?}"))
    })?;
    let normalized = body.replace("\r\n", "\n");
    let delimiter = format!("--{boundary}");

    let mut parts = Vec::new();
    for segment in normalized.split(delimiter.as_str()) {
        if segment.starts_with("--") || segment.trim().is_empty() {
            continue;
        }
        parts.push(decode_part(segment.trim_start_matches('\n'))?);
    }
    Ok(parts)
}

fn decode_part(segment: &str) -> Result<BatchPart, DriveError> {
    let (headers, response) = segment
        .split_once("\n\n")
        .ok_or_else(|| DriveError::MalformedBatch("part without headers".into()))?;
    let content_id = header_value(headers, "content-id")
        .ok_or_else(|| DriveError::MalformedBatch("part without Content-ID".into()))?;
    let index = parse_content_id(content_id).ok_or_else(|| {
        DriveError::MalformedBatch(format!("unexpected Content-ID {content_id:?}"))
    })?;

    let (head, payload) = response.split_once("\n\n").unwrap_or((response, ""));
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| DriveError::MalformedBatch(format!("bad status line in part {index}")))?;

    Ok(BatchPart {
        index,
        status,
        body: payload.trim().to_string(),
    })
}

fn boundary_param(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.eq_ignore_ascii_case("boundary")
            .then(|| value.trim_matches('"'))
    })
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

fn parse_content_id(value: &str) -> Option<usize> {
    let value = value.trim_start_matches('<').trim_end_matches('>');
    let value = value.strip_prefix("response-").unwrap_or(value);
    value.strip_prefix(CONTENT_ID_PREFIX)?.parse().ok()
}
