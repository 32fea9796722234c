use std::fs;
use std::path::Path;

use dnsfleet_core::{Entity, EntityStore};
use dnsfleet_document::parse_domain_set_file;
use dnsfleet_sync::EntityChange;
use tracing::info;

use crate::bootstrap::App;
use crate::cli::{ApplyArgs, OutputFormat, RemoveArgs};
use crate::commands::finish_job;
use crate::error::{AppError, AppResult};

/// Save an entity and push it to its nodes.
///
/// An existing entity with the same natural key is updated in place and its
/// stored selector becomes the previous selector, so nodes dropped from the
/// target set lose the entry. An entity carrying an id whose natural key
/// changed is treated as a rename: the old entry is retracted from every
/// node it targeted.
pub(crate) async fn apply(app: &App, args: ApplyArgs, format: OutputFormat) -> AppResult<()> {
    let mut entity = read_entity(&args.file)?;
    if let Some(list) = &args.domains {
        import_domains(&mut entity, list)?;
    }
    entity
        .validate()
        .map_err(|source| AppError::Entity { source })?;

    let existing = match entity.id() {
        Some(id) => app
            .store
            .find_entity(entity.kind(), id)
            .await
            .map_err(AppError::store("find_entity"))?,
        None => app
            .store
            .find_by_key(entity.kind(), &entity.natural_key())
            .await
            .map_err(AppError::store("find_by_key"))?,
    };
    if let Some(id) = existing.as_ref().and_then(Entity::id)
        && entity.id().is_none()
    {
        entity.set_id(id);
    }

    let saved = app
        .store
        .save_entity(entity)
        .await
        .map_err(AppError::store("save_entity"))?;
    info!(entity = %saved.describe(), "entity saved");

    let (renamed, kept) = match existing {
        Some(previous) if previous.natural_key() != saved.natural_key() => (Some(previous), None),
        other => (None, other),
    };
    let retraction = match renamed {
        Some(previous) => {
            info!(
                from = %previous.describe(),
                to = %saved.describe(),
                "entity renamed; retracting the old entry"
            );
            let ticket = app
                .service
                .sync_entity(EntityChange::remove(previous))
                .map_err(AppError::sync("sync_entity"))?;
            Some(ticket)
        }
        None => None,
    };

    let mut change = EntityChange::upsert(saved);
    if let Some(previous) = kept {
        change = change.retargeted_from(previous.selector().clone());
    }
    let ticket = app
        .service
        .sync_entity(change)
        .map_err(AppError::sync("sync_entity"))?;
    let retracted = match retraction {
        Some(ticket) => finish_job(ticket, format).await,
        None => Ok(()),
    };
    finish_job(ticket, format).await?;
    retracted
}

/// Delete an entity and remove it from the nodes it targeted.
pub(crate) async fn remove(app: &App, args: RemoveArgs, format: OutputFormat) -> AppResult<()> {
    let removed = app
        .store
        .delete_entity(args.kind, args.id)
        .await
        .map_err(AppError::store("delete_entity"))?;
    info!(entity = %removed.describe(), "entity deleted");
    let ticket = app
        .service
        .sync_entity(EntityChange::remove(removed))
        .map_err(AppError::sync("sync_entity"))?;
    finish_job(ticket, format).await
}

fn read_entity(path: &Path) -> AppResult<Entity> {
    let text = fs::read_to_string(path).map_err(|source| AppError::Io {
        operation: "read entity",
        path: Some(path.to_path_buf()),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| AppError::Json {
        operation: "parse entity",
        path: Some(path.to_path_buf()),
        source,
    })
}

fn import_domains(entity: &mut Entity, list: &Path) -> AppResult<()> {
    let Entity::DomainSet(set) = entity else {
        return Err(AppError::InvalidInput {
            field: "domains",
            reason: "only applies to domain_set entities",
        });
    };
    let text = fs::read_to_string(list).map_err(|source| AppError::Io {
        operation: "read domain list",
        path: Some(list.to_path_buf()),
        source,
    })?;
    set.items = parse_domain_set_file(&text);
    info!(set = %set.name, domains = set.items.len(), "imported domain list");
    Ok(())
}
