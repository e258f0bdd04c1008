use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures::future::LocalBoxFuture;
use log::{info, warn};
use std::rc::Rc;
use std::time::Instant;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Id of the request being served, when called under [`LoggerMiddleware`].
/// Error bodies and handler log context use it as their `error_id`.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

fn request_id_header(request_id: &str) -> Option<(HeaderName, HeaderValue)> {
    HeaderValue::from_str(request_id)
        .ok()
        .map(|value| (HeaderName::from_static(REQUEST_ID_HEADER), value))
}

/// Request logger middleware.
///
/// Tags every request with a request id, logs start and completion, and
/// echoes the id back in the `x-request-id` response header. Query strings
/// and bodies are not logged since they can carry tokens.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let method = req.method().to_string();
        let path = req.path().to_string();

        info!("[{}] Request started: {} {}", request_id, method, path);

        let service = self.service.clone();
        let scoped_id = request_id.clone();

        Box::pin(REQUEST_ID.scope(scoped_id, async move {
            let mut res = match service.call(req).await {
                Ok(res) => res,
                Err(e) => {
                    warn!(
                        "[{}] Request failed: {} {} - {} ({}ms)",
                        request_id,
                        method,
                        path,
                        e,
                        start_time.elapsed().as_millis()
                    );

                    // Render while the request id is still in scope so the
                    // body's error_id matches the header.
                    let mut response = e.error_response();
                    if let Some((name, value)) = request_id_header(&request_id) {
                        response.headers_mut().insert(name, value);
                    }
                    let rendered: Error = InternalError::from_response(e.to_string(), response).into();
                    return Err(rendered);
                }
            };

            if let Some((name, value)) = request_id_header(&request_id) {
                res.headers_mut().insert(name, value);
            }

            info!(
                "[{}] Request completed: {} {} - Status: {} ({}ms)",
                request_id,
                method,
                path,
                res.status().as_u16(),
                start_time.elapsed().as_millis()
            );

            Ok(res)
        }))
    }
}
