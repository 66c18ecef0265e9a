// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Minimal HTTP types for the provisioning portal

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use embedded_io_async::Write;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::setup::html::HtmlContent;

// Port for the portal HTTP server
pub(crate) const PORTAL_PORT: u16 = 80;

// Buffer sizes for the portal HTTP task
pub(crate) const HTTPD_TASK_TCP_RX_BUF_SIZE: usize = 2048;
pub(crate) const HTTPD_TASK_TCP_TX_BUF_SIZE: usize = 2048;
pub(crate) const HTTPD_HEADER_BUF_SIZE: usize = 1024;
pub(crate) const HTTPD_BODY_BUF_SIZE: usize = 512;

pub(crate) const HTTPD_MAX_HEADERS: usize = 16;

/// HTTP methods the portal serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
}

impl Method {
    pub fn from_str(method: &str) -> Option<Method> {
        match method {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    TooLarge = 413,
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl StatusCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => Self::Ok,
            400 => Self::BadRequest,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            413 => Self::TooLarge,
            503 => Self::ServiceUnavailable,
            _ => Self::InternalServerError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "200 OK",
            Self::BadRequest => "400 Bad Request",
            Self::Forbidden => "403 Forbidden",
            Self::NotFound => "404 Not Found",
            Self::TooLarge => "413 Payload Too Large",
            Self::InternalServerError => "500 Internal Server Error",
            Self::ServiceUnavailable => "503 Service Unavailable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub name: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone)]
pub(crate) struct Response {
    pub status_code: StatusCode,
    pub content: Option<String>,
    pub content_type: &'static str,
    pub headers: Vec<Header>,
}

impl Response {
    /// An HTML page response carrying the portal's security headers.
    pub fn html(content: HtmlContent, status_code: StatusCode) -> Self {
        Self {
            status_code,
            content: Some(content.0),
            content_type: "text/html",
            headers: vec![
                Header {
                    name: "X-Frame-Options",
                    value: "DENY",
                },
                Header {
                    name: "X-Content-Type-Options",
                    value: "nosniff",
                },
            ],
        }
    }

    /// An HTML error page for the given status.
    pub fn error_page(status_code: StatusCode, message: &str) -> Self {
        Self::html(
            crate::setup::html::page_error(status_code.as_str(), message),
            status_code,
        )
    }

    /// An HTML error page whose status comes from the error taxonomy.
    pub fn error(error: crate::SetupError, message: &str) -> Self {
        Self::error_page(StatusCode::from_u16(error.status_code()), message)
    }

    pub async fn write_to(
        &self,
        socket: &mut embassy_net::tcp::TcpSocket<'_>,
    ) -> Result<(), embassy_net::tcp::Error> {
        let content_len = self.content.as_ref().map_or(0, |c| c.len());

        let header_str = alloc::format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: {}\r\n",
            self.status_code.as_str(),
            content_len,
            self.content_type,
        );
        socket.write_all(header_str.as_bytes()).await?;

        for header in &self.headers {
            let header_line = alloc::format!("{}: {}\r\n", header.name, header.value);
            socket.write_all(header_line.as_bytes()).await?;
        }
        socket.write_all(b"\r\n").await?;

        if let Some(content) = &self.content {
            socket.write_all(content.as_bytes()).await?;
        }

        Ok(())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code)
    }
}
