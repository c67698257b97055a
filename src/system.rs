use crate::{
    api::{ApiResponse, Service},
    config::Config,
    logging,
    router::BANNER,
};
use futures::lock::Mutex;
use js_sys::Promise;
use serde_json::Value;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

/// Browser entry point. Every request method takes a JSON string and resolves
/// to a JSON string `{status, body}`.
#[wasm_bindgen]
pub struct System {
    service: Rc<Mutex<Service>>,
}

fn body(request: &str) -> Value {
    // unparsable input becomes null, which every handler rejects with a 400
    serde_json::from_str(request).unwrap_or(Value::Null)
}

fn reply(response: ApiResponse) -> JsValue {
    let text = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"status":500,"body":{"error":"Internal server error"}}"#.to_string());
    JsValue::from_str(&text)
}

#[wasm_bindgen]
impl System {
    #[wasm_bindgen(constructor)]
    pub fn new(config: Option<String>) -> Result<System, JsValue> {
        logging::init();
        let config = Config::from_json(config.as_deref().unwrap_or(""))
            .map_err(|e| JsValue::from_str(&format!("invalid config: {}", e)))?;
        Ok(System {
            service: Rc::new(Mutex::new(Service::from_config(config))),
        })
    }

    #[wasm_bindgen]
    pub fn banner() -> String {
        BANNER.to_string()
    }

    #[wasm_bindgen]
    pub fn execute(&self, request: String) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let mut service = service.lock().await;
            Ok(reply(service.execute(&body(&request)).await))
        })
    }

    #[wasm_bindgen]
    pub fn submit(&self, request: String) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let mut service = service.lock().await;
            Ok(reply(service.submit(&body(&request)).await))
        })
    }

    #[wasm_bindgen]
    pub fn interpret(&self, request: String) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let mut service = service.lock().await;
            Ok(reply(service.interpret(&body(&request)).await))
        })
    }

    #[wasm_bindgen]
    pub fn upload(&self, request: String) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let mut service = service.lock().await;
            Ok(reply(service.upload(&body(&request))))
        })
    }

    #[wasm_bindgen]
    pub fn list_uploads(&self, session_id: Option<String>) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let mut service = service.lock().await;
            Ok(reply(service.list_uploads(session_id.as_deref())))
        })
    }

    #[wasm_bindgen]
    pub fn clear_uploads(&self, session_id: Option<String>) -> Promise {
        let service = self.service.clone();
        future_to_promise(async move {
            let mut service = service.lock().await;
            Ok(reply(service.clear_uploads(session_id.as_deref())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_body_is_null() {
        assert_eq!(body("{not json"), Value::Null);
        assert_eq!(body(r#"{"command":"ls"}"#)["command"], "ls");
    }
}
