// projection_cache.rs — Projection caching as seen through the staging area.

mod common;

use std::sync::Arc;

use serde_json::json;
use strata_changeset::StagedChange;
use strata_model::Model;
use strata_workspace::CommitOptions;

use common::{add, fields, file_area};

#[test]
fn repeated_preview_hits_cache() {
    let (_dir, mut area) = file_area();
    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();

    let first = area.preview_layer(&cs.id, "business").unwrap();
    let second = area.preview_layer(&cs.id, "business").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(area.projection().cache_stats().hits, 1);
}

#[test]
fn stage_invalidates_only_its_layer() {
    let (_dir, mut area) = file_area();
    let cs = area.create("cs1", "").unwrap();

    let business = area.preview_layer(&cs.id, "business").unwrap();
    let application = area.preview_layer(&cs.id, "application").unwrap();

    area.stage(&cs.id, add("business", "X")).unwrap();

    let business_after = area.preview_layer(&cs.id, "business").unwrap();
    assert!(!Arc::ptr_eq(&business, &business_after));
    assert!(business_after.contains("X"));

    let application_after = area.preview_layer(&cs.id, "application").unwrap();
    assert!(Arc::ptr_eq(&application, &application_after));
}

#[test]
fn unstage_invalidates_affected_layers() {
    let (_dir, mut area) = file_area();
    let cs = area.create("cs1", "").unwrap();
    area.stage(
        &cs.id,
        StagedChange::update("business", "customer", None, fields(json!({ "name": "Client" }))),
    )
    .unwrap();

    let before = area.preview_layer(&cs.id, "business").unwrap();
    assert_eq!(before.element("customer").unwrap().name, "Client");

    area.unstage(&cs.id, "customer").unwrap();
    let after = area.preview_layer(&cs.id, "business").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.element("customer").unwrap().name, "Customer");
}

#[test]
fn discard_purges_every_entry() {
    let (_dir, mut area) = file_area();
    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();
    area.preview_model(&cs.id).unwrap();
    assert_eq!(area.projection().cache_stats().entries, 2);

    area.discard(&cs.id).unwrap();
    assert_eq!(area.projection().cache_stats().entries, 0);
}

#[test]
fn commit_drops_stale_projections() {
    let (_dir, mut area) = file_area();
    let cs = area.create("cs1", "").unwrap();
    let other = area.create("cs2", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();

    let stale = area.preview_layer(&other.id, "business").unwrap();
    assert!(!stale.contains("X"));

    area.commit(&cs.id, CommitOptions::default()).unwrap();
    assert_eq!(area.projection().cache_stats().entries, 0);

    // The other changeset now sees the committed element in its base.
    let fresh = area.preview_layer(&other.id, "business").unwrap();
    assert!(fresh.contains("X"));
    assert!(area.model().layer("business").unwrap().contains("X"));
}

#[test]
fn preview_element_uses_last_staged_change() {
    let (_dir, mut area) = file_area();
    let cs = area.create("cs1", "").unwrap();

    area.stage(
        &cs.id,
        StagedChange::update(
            "business",
            "customer",
            None,
            fields(json!({ "properties": { "tier": "gold" } })),
        ),
    )
    .unwrap();
    let customer = area.preview_element(&cs.id, "customer").unwrap().unwrap();
    assert_eq!(customer.properties["tier"], "gold");

    area.stage(&cs.id, StagedChange::delete("business", "customer", None))
        .unwrap();
    assert!(area.preview_element(&cs.id, "customer").unwrap().is_none());

    // Untouched elements pass through.
    let portal = area.preview_element(&cs.id, "portal").unwrap().unwrap();
    assert_eq!(portal.name, "Portal");
}
