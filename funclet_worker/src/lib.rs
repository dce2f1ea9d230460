// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use funclet_api::worker::{FunctionWorkerAPI, InitRequest, InitResponse};

pub mod binding;
pub mod broker;
pub mod builtin_host;
pub mod callable;
pub mod context;
pub mod lifecycle;
pub mod pipeline;

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct FuncletWorkerSettings {
    pub worker_id: uuid::Uuid,
    pub working_directory: Option<std::path::PathBuf>,
}

pub async fn funclet_worker_main(settings: FuncletWorkerSettings) {
    log::info!("Starting FUNCLET worker node");
    log::debug!("Settings: {:?}", settings);

    // Create the telemetry provider.
    let telemetry_provider = funclet_telemetry::telemetry_events::TelemetryProcessor::new();

    // Create the worker with the builtin callable host and the default
    // extension set; a real deployment plugs its own capabilities in here.
    let host = std::sync::Arc::new(builtin_host::BuiltinCallableHost::new());
    let extensions = std::sync::Arc::new(builtin_host::DefaultExtensions::new());
    let (client, mut worker_task) = lifecycle::create(
        host,
        extensions,
        Box::new(telemetry_provider.get_handle(std::collections::BTreeMap::from([(
            "WORKER_ID".to_string(),
            settings.worker_id.to_string(),
        )]))),
    );
    let worker_task = tokio::spawn(async move {
        worker_task.run().await;
    });

    // The transport that feeds host requests into the client is an external
    // component. Standalone, the worker initializes itself and then serves
    // until it is asked to shut down.
    let mut client = client;
    match client
        .init(InitRequest {
            worker_id: settings.worker_id,
            working_directory: settings.working_directory.clone(),
            host_version: "standalone".to_string(),
        })
        .await
    {
        Ok(InitResponse::Accepted(properties)) => {
            log::info!("worker version {}, capabilities [{}]", properties.worker_version, properties.capabilities.join(","))
        }
        Ok(InitResponse::ResponseError(err)) => log::error!("initialization rejected: {}", err),
        Err(err) => log::error!("initialization failed: {}", err),
    }

    let _ = tokio::signal::ctrl_c().await;
    log::info!("shutdown requested");
    if let Err(err) = client.terminate().await {
        log::error!("termination failed: {}", err);
    }
    let _ = worker_task.await;
}

pub fn funclet_worker_default_conf() -> String {
    String::from(
        r##"worker_id = "fda6ce79-46df-4f96-a0d2-456f720f606c"
# working_directory = "/var/lib/funclet"
"##,
    )
}
