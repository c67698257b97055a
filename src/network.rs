//! Minimal JSON POST transport: browser `fetch` under wasm, `reqwest` natively.

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(target_arch = "wasm32")]
pub async fn post_json(url: &str, headers: &[(&str, &str)], body: &str) -> Result<HttpResponse, String> {
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{Request, RequestInit, RequestMode, Response};

    let opts = RequestInit::new();
    opts.set_method("POST");
    opts.set_mode(RequestMode::Cors);
    opts.set_body(&JsValue::from_str(body));

    let request = Request::new_with_str_and_init(url, &opts)
        .map_err(|e| format!("Failed to create request: {:?}", e))?;

    request
        .headers()
        .set("Content-Type", "application/json")
        .map_err(|e| format!("Failed to set header: {:?}", e))?;
    for (name, value) in headers {
        request
            .headers()
            .set(name, value)
            .map_err(|e| format!("Failed to set header: {:?}", e))?;
    }

    let window = web_sys::window().ok_or("No window object")?;
    let resp_value = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| format!("Fetch failed: {:?}", e))?;

    let resp: Response = resp_value
        .dyn_into()
        .map_err(|_| "Response is not a Response object")?;
    let status = resp.status();

    let text = JsFuture::from(
        resp.text()
            .map_err(|e| format!("Failed to get text: {:?}", e))?,
    )
    .await
    .map_err(|e| format!("Failed to read text: {:?}", e))?;

    let body = text
        .as_string()
        .ok_or_else(|| "Response text is not a string".to_string())?;
    Ok(HttpResponse { status, body })
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn post_json(url: &str, headers: &[(&str, &str)], body: &str) -> Result<HttpResponse, String> {
    use once_cell::sync::Lazy;

    static CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

    let mut request = CLIENT
        .post(url)
        .header("Content-Type", "application/json")
        .body(body.to_string());
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let resp = request
        .send()
        .await
        .map_err(|e| format!("Request failed: {}", e))?;
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .map_err(|e| format!("Failed to read body: {}", e))?;
    Ok(HttpResponse { status, body })
}
