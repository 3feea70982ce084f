//! `info`: dataset report plus the tracked category listing.

use platforms_api::PlatformClient;
use serde::Serialize;
use tracing::warn;

use crate::Result;
use crate::acquisition::{DatasetMonitor, DatasetReport};
use crate::database::models::CategoryDbModel;
use crate::database::repositories::CatalogRepository;

use super::Harvest;

/// Refresh every category name from the platform. Lookup failures keep the
/// stored name. Returns how many names changed.
pub async fn resolve_names(
    catalog: &dyn CatalogRepository,
    platform: &dyn PlatformClient,
) -> Result<usize> {
    let mut renamed = 0;
    for category in catalog.list_categories().await? {
        match platform.category_name(&category.id).await {
            Ok(name) if name != category.name => {
                catalog.rename_category(&category.id, &name).await?;
                renamed += 1;
            }
            Ok(_) => {}
            Err(e) => warn!(category = %category.id, error = %e, "Category name lookup failed"),
        }
    }
    Ok(renamed)
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    report: &'a DatasetReport,
    categories: &'a [CategoryDbModel],
}

fn format_listing(categories: &[CategoryDbModel]) -> String {
    let id_width = categories.iter().map(|c| c.id.len()).max().unwrap_or(0);
    categories
        .iter()
        .map(|c| format!("{:>id_width$}  {:>6}  {}", c.id, c.frame_count, c.name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn execute(harvest: &Harvest, refresh_names: bool, json: bool) -> Result<()> {
    if refresh_names {
        let platform = harvest.platform_client();
        let renamed = resolve_names(harvest.catalog.as_ref(), &platform).await?;
        if !json {
            println!("Updated {renamed} category name(s).");
        }
    }

    let monitor = DatasetMonitor::new(
        harvest.catalog(),
        harvest.store.clone(),
        harvest.config.monitor.interval(),
    );
    let report = monitor.report().await?;
    let categories = harvest.catalog.list_categories().await?;

    if json {
        let output = InfoOutput {
            report: &report,
            categories: &categories,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{report}");
    if !categories.is_empty() {
        println!();
        println!("{}", format_listing(&categories));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_listing_aligns_ids() {
        let categories = vec![
            CategoryDbModel::new("21779", "League of Legends"),
            CategoryDbModel::new("1", "Tiny"),
        ];
        let listing = format_listing(&categories);
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0], "21779       0  League of Legends");
        assert_eq!(lines[1], "    1       0  Tiny");
    }

    #[test]
    fn test_json_output_shape() {
        let report = DatasetReport {
            size_bytes: 2048,
            categories: 1,
            frames: 0,
            min: None,
            max: None,
        };
        let categories = vec![CategoryDbModel::new("1", "Tiny")];
        let value = serde_json::to_value(InfoOutput {
            report: &report,
            categories: &categories,
        })
        .unwrap();

        assert_eq!(value["report"]["size_bytes"], 2048);
        assert!(value["report"]["min"].is_null());
        assert_eq!(value["categories"][0]["id"], "1");
    }
}
