// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost - Portal HTML strings and objects

use alloc::format;
use alloc::string::String;

/// An HTML page assembled for the portal.
pub struct HtmlContent(pub String);

impl HtmlContent {
    fn header(title: &str) -> String {
        format!(
            r#"<!DOCTYPE html><html><head><meta charset='utf-8'><meta name='viewport' content='width=device-width,initial-scale=1'><title>{title}</title><style>body{{font-family:sans-serif;margin:40px;background:#f0f0f0}}.card{{max-width:400px;margin:0 auto;background:white;padding:30px;border-radius:10px;box-shadow:0 2px 10px rgba(0,0,0,0.1)}}h1{{color:#333;text-align:center}}input{{width:100%;padding:12px;margin:8px 0;border:1px solid #ddd;border-radius:5px;box-sizing:border-box;font-size:16px}}button{{width:100%;padding:15px;background:#2e7d32;color:white;border:none;border-radius:5px;font-size:16px;cursor:pointer;margin-top:10px}}.info{{background:#e8f5e9;padding:15px;border-radius:5px;margin-bottom:20px;color:#1b5e20;font-size:14px}}.error{{background:#fdecea;padding:15px;border-radius:5px;color:#8a1c13;font-size:14px}}</style></head>"#
        )
    }

    pub(crate) fn new(title: &str, body: &str) -> Self {
        let header = Self::header(title);
        HtmlContent(format!(
            r#"{header}<body><div class="card">{body}</div></body></html>"#
        ))
    }
}

/// The provisioning form.  Embeds the shared setup secret for the operator
/// and the outstanding CSRF token as a hidden field.
pub(crate) fn page_setup_form(secret: &str, csrf: &str) -> HtmlContent {
    let body = format!(
        r#"<h1>Gatepost Setup</h1><div class="info">Connect this gate sensor to your WiFi network. Setup password: <strong>{secret}</strong></div><form action="/save" method="post"><input type="password" name="setup_pwd" placeholder="Setup password" required maxlength="8"><input type="text" name="ssid" placeholder="WiFi network name" required maxlength="31"><input type="password" name="password" placeholder="WiFi password" maxlength="63"><input type="hidden" name="csrf" value="{csrf}"><button type="submit">Save &amp; Connect</button></form>"#
    );
    HtmlContent::new("Gatepost Setup", &body)
}

/// Shown after credentials were accepted and stored.
pub(crate) fn page_success() -> HtmlContent {
    HtmlContent::new(
        "Saved",
        r#"<h1>Saved</h1><div class="info">Credentials stored. The sensor is connecting to your network and this access point will shut down.</div>"#,
    )
}

/// Generic error page.
pub(crate) fn page_error(title: &str, message: &str) -> HtmlContent {
    let body = format!(r#"<h1>Setup</h1><div class="error"><strong>{title}</strong><br>{message}</div>"#);
    HtmlContent::new("Gatepost Setup", &body)
}
