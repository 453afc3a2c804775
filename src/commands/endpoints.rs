use crate::output::UserOutput;
use mcp_manager::{endpoints, EndpointEmitter, JsonEmitter, Supervisor};

pub async fn run_endpoints(
    supervisor: &Supervisor,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let host = supervisor.resolver().resolve(false).await;
    let list = endpoints(supervisor.store(), &host);

    if json {
        let mut emitter = JsonEmitter::new(Vec::new());
        emitter.emit(&list)?;
        out.status(String::from_utf8_lossy(&emitter.into_inner()).trim_end());
        return Ok(());
    }

    if list.is_empty() {
        out.status("No enabled servers configured");
        return Ok(());
    }
    for endpoint in &list {
        out.status(&format!(
            "  {:<24} {:<40} origin {}",
            endpoint.name,
            endpoint.url.as_deref().unwrap_or("(no port)"),
            endpoint.allow_origin
        ));
    }
    Ok(())
}
