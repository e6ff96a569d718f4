//! Function entry point for the rate rule custom resource.

use std::sync::Arc;

use lambda_runtime::{LambdaEvent, run, service_fn};
use serde_json::Value;

use ratewall_core::HandlerConfig;
use ratewall_core::observability::init_logging;
use ratewall_resource::control_plane::wafv2::WafV2ControlPlane;
use ratewall_resource::guard::IdempotencyGuard;
use ratewall_resource::handler::CustomResourceHandler;
use ratewall_resource::outcome::Outcome;
use ratewall_resource::reporter::http::HttpReporter;

type Handler = CustomResourceHandler<WafV2ControlPlane, HttpReporter>;

async fn function_handler(
    handler: Arc<Handler>,
    event: LambdaEvent<Value>,
) -> Result<Outcome, lambda_runtime::Error> {
    tracing::debug!(aws_request_id = %event.context.request_id, "invocation received");
    handler
        .handle_value(event.payload)
        .await
        .map_err(lambda_runtime::Error::from)
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    let config = HandlerConfig::from_env()?;
    init_logging(config.log_level, config.log_format);
    tracing::info!(
        app_env = %config.app_env,
        default_rate_limit = config.default_rate_limit,
        "starting rate rule handler"
    );

    let control_plane = Arc::new(WafV2ControlPlane::from_env(config.acl_description.clone()).await);
    let reporter = Arc::new(HttpReporter::new(&config)?);
    let guard = Arc::new(IdempotencyGuard::new());
    let handler = Arc::new(CustomResourceHandler::new(
        control_plane,
        reporter,
        guard,
        &config,
    ));

    run(service_fn(move |event: LambdaEvent<Value>| {
        function_handler(Arc::clone(&handler), event)
    }))
    .await
}
