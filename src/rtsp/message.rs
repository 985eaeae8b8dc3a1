use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// The method subset this engine speaks, per section 4.F's M1-M16 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
    SetParameter,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::SetParameter => "SET_PARAMETER",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "OPTIONS" => Some(Method::Options),
            "SETUP" => Some(Method::Setup),
            "PLAY" => Some(Method::Play),
            "PAUSE" => Some(Method::Pause),
            "TEARDOWN" => Some(Method::Teardown),
            "GET_PARAMETER" => Some(Method::GetParameter),
            "SET_PARAMETER" => Some(Method::SetParameter),
            _ => None,
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Case-insensitive header bag preserving the original insertion order, which
/// matters for `Public:` in OPTIONS responses.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    pub uri: String,
    pub cseq: u32,
    pub headers: Headers,
    pub body: Option<String>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: impl Into<String>, cseq: u32) -> Self {
        Self { method, uri: uri.into(), cseq, headers: Headers::new(), body: None }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.headers.insert("Content-Type", "text/parameters");
        self.headers.insert("Content-Length", body.len().to_string());
        self.body = Some(body);
        self
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        out.push_str(&format!("CSeq: {}\r\n", self.cseq));
        for (name, value) in self.headers.iter() {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        if let Some(body) = &self.body {
            out.push_str(body);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status: u16,
    pub reason: String,
    pub cseq: u32,
    pub headers: Headers,
    pub body: Option<String>,
}

impl RtspResponse {
    pub fn ok(cseq: u32) -> Self {
        Self { status: 200, reason: "OK".to_string(), cseq, headers: Headers::new(), body: None }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.headers.insert("Content-Type", "text/parameters");
        self.headers.insert("Content-Length", body.len().to_string());
        self.body = Some(body);
        self
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("RTSP/1.0 {} {}\r\n", self.status, self.reason);
        out.push_str(&format!("CSeq: {}\r\n", self.cseq));
        for (name, value) in self.headers.iter() {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        if let Some(body) = &self.body {
            out.push_str(body);
        }
        out
    }
}

pub fn parse_headers(lines: &[String]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            out.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    out
}

#[cfg(test)]
mod serialize {
    use super::{Method, RtspRequest, RtspResponse};

    #[test]
    fn request_serializes_method_uri_and_cseq() {
        let req = RtspRequest::new(Method::Options, "*", 1);
        let text = req.serialize();

        assert!(text.starts_with("OPTIONS * RTSP/1.0\r\n"));
        assert!(text.contains("CSeq: 1\r\n"));
    }

    #[test]
    fn request_with_body_sets_content_length() {
        let req = RtspRequest::new(Method::SetParameter, "rtsp://localhost/wfd1.0", 2).with_body("wfd_idr_request\r\n");

        assert!(req.serialize().contains("Content-Length: 18\r\n"));
    }

    #[test]
    fn response_serializes_status_line() {
        let resp = RtspResponse::ok(5);
        assert!(resp.serialize().starts_with("RTSP/1.0 200 OK\r\n"));
    }
}
