// kube client for the runner, identified by its own user-agent
use crate::error::Result;
use hyper::http::{HeaderName, HeaderValue};
use kube::{Client, Config};
use tracing::warn;

/// Create a k8s client from the inferred kubeconfig or in-cluster config
///
/// # Errors
///
/// Will return `Err` if no configuration can be inferred or the client cannot be built
pub async fn new(user_agent: &str) -> Result<Client> {
    let mut config = Config::infer().await?;
    add_user_agent(&mut config, user_agent);
    Ok(Client::try_from(config)?)
}

/// Append a user-agent header. An invalid value leaves kube's default in place.
pub fn add_user_agent(config: &mut Config, user_agent: &str) {
    match HeaderValue::from_str(user_agent) {
        Ok(value) => config
            .headers
            .push((HeaderName::from_static("user-agent"), value)),
        Err(e) => warn!("Ignoring invalid user agent {:?}: {}", user_agent, e),
    }
}
