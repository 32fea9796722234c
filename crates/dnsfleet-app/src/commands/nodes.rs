use dnsfleet_core::{NewNode, NodeCredentials, NodeId, NodeStore};
use tracing::info;

use crate::bootstrap::App;
use crate::cli::{NodeAddArgs, OutputFormat};
use crate::error::{AppError, AppResult};
use crate::output;

pub(crate) async fn list(app: &App, format: OutputFormat) -> AppResult<()> {
    let nodes = app
        .store
        .list_nodes()
        .await
        .map_err(AppError::store("list_nodes"))?;
    output::emit(&output::render_nodes(&nodes, format)?);
    Ok(())
}

pub(crate) async fn add(app: &App, args: NodeAddArgs, format: OutputFormat) -> AppResult<()> {
    let node = app
        .store
        .create_node(new_node(args))
        .await
        .map_err(AppError::store("create_node"))?;
    info!(node_id = node.id, name = %node.name, "node registered");
    output::emit(&output::render_nodes(std::slice::from_ref(&node), format)?);
    Ok(())
}

pub(crate) async fn remove(app: &App, id: NodeId) -> AppResult<()> {
    app.store
        .delete_node(id)
        .await
        .map_err(AppError::store("delete_node"))?;
    info!(node_id = id, "node removed");
    Ok(())
}

fn new_node(args: NodeAddArgs) -> NewNode {
    NewNode {
        name: args.name,
        host: args.host,
        port: args.port,
        username: args.user,
        credentials: args
            .key_file
            .map_or(NodeCredentials::Agent, |path| NodeCredentials::KeyFile { path }),
        jump_host: args.jump_host,
        config_path: args.config_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::tests::memory_app;

    #[tokio::test]
    async fn added_nodes_are_listed() -> anyhow::Result<()> {
        let app = memory_app(0)?;
        let args = NodeAddArgs {
            name: "edge-1".into(),
            host: "10.0.0.5".into(),
            port: 2222,
            user: "dns".into(),
            key_file: Some("/keys/edge".into()),
            jump_host: None,
            config_path: None,
        };
        add(&app, args, OutputFormat::Json).await?;

        let nodes = app.store.list_nodes().await?;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].port, 2222);
        assert_eq!(
            nodes[0].credentials,
            NodeCredentials::KeyFile {
                path: "/keys/edge".into()
            }
        );

        remove(&app, nodes[0].id).await?;
        assert!(app.store.list_nodes().await?.is_empty());
        Ok(())
    }
}
