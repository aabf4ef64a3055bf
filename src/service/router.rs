//! Method dispatch for the service host

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::protocol::{
    BRAILLE_MESSAGE, CANCEL_SPEECH, CapabilityVersion, GET_PROCESS_ID, SPEAK_SSML, SPEAK_TEXT,
    SsmlRequest, TextParams,
};
use crate::service::handler::ControllerHandler;
use crate::status::StatusCode;

/// Type-erased handler function
type ErasedHandler = Box<
    dyn Fn(&[u8]) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, StatusCode>> + Send>>
        + Send
        + Sync,
>;

/// Routes decoded requests to a [`ControllerHandler`]
///
/// Only the methods of the configured capability version are registered;
/// everything else answers [`StatusCode::UNKNOWN_INTERFACE`].
pub(crate) struct Router {
    handlers: HashMap<&'static str, ErasedHandler>,
}

impl Router {
    pub fn new<H: ControllerHandler>(handler: Arc<H>, version: CapabilityVersion) -> Self {
        let mut router = Self {
            handlers: HashMap::new(),
        };

        let h = Arc::clone(&handler);
        router.register(SPEAK_TEXT, move |params: TextParams| {
            require_text(&params.text)?;
            h.speak_text(&params.text)?;
            encode(&())
        });

        let h = Arc::clone(&handler);
        router.register(BRAILLE_MESSAGE, move |params: TextParams| {
            require_text(&params.text)?;
            h.braille_message(&params.text)?;
            encode(&())
        });

        let h = Arc::clone(&handler);
        router.register(CANCEL_SPEECH, move |_: ()| {
            h.cancel_speech()?;
            encode(&())
        });

        if version >= CapabilityVersion::SSML {
            let h = Arc::clone(&handler);
            router.register(SPEAK_SSML, move |request: SsmlRequest| {
                require_text(&request.markup)?;
                h.speak_ssml(&request)?;
                encode(&())
            });

            router.register(GET_PROCESS_ID, move |_: ()| encode(&std::process::id()));
        }

        router
    }

    /// Register an operation; `op` runs on the blocking pool
    fn register<P, F>(&mut self, method: &'static str, op: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Result<Vec<u8>, StatusCode> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let handler: ErasedHandler = Box::new(move |params: &[u8]| {
            let decoded: Result<P, _> = rmp_serde::from_slice(params);
            let op = Arc::clone(&op);
            Box::pin(async move {
                let params = decoded.map_err(|e| {
                    tracing::debug!(method, error = %e, "undecodable params");
                    StatusCode::INVALID_PARAMETER
                })?;
                blocking::unblock(move || op(params)).await
            })
        });
        self.handlers.insert(method, handler);
    }

    /// Handle an incoming request
    pub async fn handle(&self, method: &str, params: &[u8]) -> Result<Vec<u8>, StatusCode> {
        let handler = self
            .handlers
            .get(method)
            .ok_or(StatusCode::UNKNOWN_INTERFACE)?;

        handler(params).await
    }

    /// Registered method names
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}

fn require_text(text: &str) -> Result<(), StatusCode> {
    if text.is_empty() {
        return Err(StatusCode::INVALID_PARAMETER);
    }
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StatusCode> {
    rmp_serde::to_vec(value).map_err(|_| StatusCode::PROTOCOL_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        spoken: Mutex<Vec<String>>,
    }

    impl ControllerHandler for Recorder {
        fn speak_text(&self, text: &str) -> Result<(), StatusCode> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn braille_message(&self, _text: &str) -> Result<(), StatusCode> {
            Err(StatusCode::NOT_READY)
        }

        fn cancel_speech(&self) -> Result<(), StatusCode> {
            Ok(())
        }
    }

    fn params<T: Serialize>(value: &T) -> Vec<u8> {
        rmp_serde::to_vec(value).unwrap()
    }

    #[test]
    fn test_router_dispatch() {
        let recorder = Arc::new(Recorder::default());
        let router = Router::new(Arc::clone(&recorder), CapabilityVersion::CURRENT);

        let text = TextParams {
            text: "hello".to_string(),
        };
        let reply = smol::block_on(router.handle(SPEAK_TEXT, &params(&text))).unwrap();
        let () = rmp_serde::from_slice(&reply).unwrap();
        assert_eq!(*recorder.spoken.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_handler_status_passes_through() {
        let router = Router::new(Arc::new(Recorder::default()), CapabilityVersion::CURRENT);
        let text = TextParams {
            text: "dots".to_string(),
        };
        let result = smol::block_on(router.handle(BRAILLE_MESSAGE, &params(&text)));
        assert_eq!(result, Err(StatusCode::NOT_READY));
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let router = Router::new(Arc::new(Recorder::default()), CapabilityVersion::CURRENT);
        let text = TextParams {
            text: String::new(),
        };
        let result = smol::block_on(router.handle(SPEAK_TEXT, &params(&text)));
        assert_eq!(result, Err(StatusCode::INVALID_PARAMETER));
    }

    #[test]
    fn test_base_version_lacks_ssml_and_pid() {
        let router = Router::new(Arc::new(Recorder::default()), CapabilityVersion::BASE);
        let mut methods: Vec<_> = router.methods().collect();
        methods.sort_unstable();
        assert_eq!(methods, vec![BRAILLE_MESSAGE, CANCEL_SPEECH, SPEAK_TEXT]);

        let result = smol::block_on(router.handle(GET_PROCESS_ID, &params(&())));
        assert_eq!(result, Err(StatusCode::UNKNOWN_INTERFACE));
    }

    #[test]
    fn test_default_ssml_handler_is_unknown_interface() {
        let router = Router::new(Arc::new(Recorder::default()), CapabilityVersion::CURRENT);
        let request = SsmlRequest::new("<speak>hi</speak>");
        let result = smol::block_on(router.handle(SPEAK_SSML, &params(&request)));
        assert_eq!(result, Err(StatusCode::UNKNOWN_INTERFACE));
    }

    #[test]
    fn test_process_id_is_own_pid() {
        let router = Router::new(Arc::new(Recorder::default()), CapabilityVersion::CURRENT);
        let reply = smol::block_on(router.handle(GET_PROCESS_ID, &params(&()))).unwrap();
        let pid: u32 = rmp_serde::from_slice(&reply).unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_garbage_params_are_invalid_parameter() {
        let router = Router::new(Arc::new(Recorder::default()), CapabilityVersion::CURRENT);
        let result = smol::block_on(router.handle(SPEAK_TEXT, &[0xc1]));
        assert_eq!(result, Err(StatusCode::INVALID_PARAMETER));
    }
}
