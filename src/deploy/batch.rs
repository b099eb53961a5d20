/*!
 * Independent deployments run side by side
 *
 * Each deployment is sequential on its own; only the HTTP client is shared.
 * One failure does not stop the others.
 */

use rayon::prelude::*;
use tracing::{error, info};

use super::{DeployRequest, Deployer, DeploymentResult};
use crate::api::ConnectApi;
use crate::config::DeployConfig;
use crate::core::cancel::CancelToken;
use crate::error::{Result, RsconnectError};

/// Deploy every request with at most `config.max_in_flight` running at once
///
/// Results come back in request order.
pub fn deploy_many(
    api: &dyn ConnectApi,
    config: &DeployConfig,
    cancel: &CancelToken,
    requests: &[DeployRequest],
) -> Result<Vec<Result<DeploymentResult>>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_in_flight.max(1))
        .thread_name(|i| format!("rsconnect-deploy-{}", i))
        .build()
        .map_err(|e| RsconnectError::Other(format!("Failed to start deploy pool: {}", e)))?;

    info!(
        deployments = requests.len(),
        max_in_flight = config.max_in_flight,
        "Starting batch deployment"
    );

    let results: Vec<Result<DeploymentResult>> = pool.install(|| {
        requests
            .par_iter()
            .map(|request| {
                let result = Deployer::new(api, config, cancel).deploy(request);
                if let Err(e) = &result {
                    error!(
                        directory = %request.bundle.directory.display(),
                        "Deployment failed: {}",
                        e
                    );
                }
                result
            })
            .collect()
    });

    Ok(results)
}
