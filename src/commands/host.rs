use crate::output::UserOutput;
use mcp_manager::HostResolver;

pub async fn run_host(
    resolver: &HostResolver,
    refresh: bool,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let info = resolver.resolve(refresh).await;
    if json {
        out.status(&serde_json::to_string_pretty(&info)?);
    } else {
        out.status(&format!(
            "{} (source: {}, resolved {})",
            info.resolved_host,
            info.source,
            info.resolved_at.to_rfc3339()
        ));
    }
    Ok(())
}
