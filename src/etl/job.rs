//! Job Orchestrator: drives the pipeline per available time partition.
//!
//! One run is a synchronous sequence: build the stop registry, derive
//! legs for every needed day partition (ascending), refresh the side
//! datasets, then aggregate every needed month partition (ascending).
//! Partition writes are atomic, so a killed run leaves the datasets in
//! their previous valid state plus whatever partitions completed, and the
//! next run recomputes `needed()` from scratch. One orchestrator per
//! output dataset; concurrent runs against the same root are not
//! supported.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::etl::aggregate::aggregate_month;
use crate::etl::cleaner::clean_arrivals;
use crate::etl::direction::{CanonicalDirections, discover_route_names};
use crate::etl::legs::derive_legs;
use crate::etl::partitioning;
use crate::model::{ArrivalEvent, Leg, RouteName, StopLine};
use crate::stops::StopRegistry;
use crate::store;

/// Configuration surface consumed by one pipeline run.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Path prefix under which all partitioned datasets live.
    pub root: PathBuf,
    /// Earliest partition to process.
    pub from_date: NaiveDate,
    /// Force full recomputation of every derived partition.
    pub invalidate_all: bool,
    /// Gzip-compress written partition files.
    pub gzip: bool,
}

impl JobConfig {
    pub fn arrivals_dir(&self) -> PathBuf {
        self.root.join("arrivals")
    }

    pub fn legs_dir(&self) -> PathBuf {
        self.root.join("legs")
    }

    pub fn route_names_dir(&self) -> PathBuf {
        self.root.join("route_names")
    }

    pub fn leg_stats_dir(&self) -> PathBuf {
        self.root.join("leg_stats")
    }
}

/// Runs the whole pipeline once.
#[tracing::instrument(skip(config), fields(root = %config.root.display()))]
pub fn run(config: &JobConfig) -> Result<()> {
    let stops = StopRegistry::load(&config.root)?;

    let needed_days = needed_leg_partitions(config)?;
    info!(partitions = needed_days.len(), "Deriving leg partitions");
    for partition in &needed_days {
        derive_leg_partition(config, &stops, *partition)?;
    }

    write_datasources(config)?;
    write_stop_lines(config)?;

    let needed_months = needed_stat_partitions(config)?;
    info!(partitions = needed_months.len(), "Aggregating month partitions");
    for month in &needed_months {
        aggregate_stat_partition(config, *month)?;
    }

    info!("Run complete");
    Ok(())
}

/// Day partitions the leg derivation still has to process.
pub fn needed_leg_partitions(config: &JobConfig) -> Result<BTreeSet<NaiveDate>> {
    let source = partitioning::available_daily(&config.arrivals_dir())?;
    let dest = partitioning::available_daily(&config.legs_dir())?;
    Ok(partitioning::needed(
        &source,
        &dest,
        config.invalidate_all,
        config.from_date,
    ))
}

/// Month partitions the aggregation still has to process.
pub fn needed_stat_partitions(config: &JobConfig) -> Result<BTreeSet<NaiveDate>> {
    let source = partitioning::available_monthly_from_daily(&config.legs_dir())?;
    let dest = partitioning::available_monthly(&config.leg_stats_dir())?;
    Ok(partitioning::needed(
        &source,
        &dest,
        config.invalidate_all,
        partitioning::truncate_to_month(config.from_date),
    ))
}

/// Clean → route names → derive → write, for one day partition.
#[tracing::instrument(skip(config, stops), fields(partition = %partition))]
fn derive_leg_partition(
    config: &JobConfig,
    stops: &StopRegistry,
    partition: NaiveDate,
) -> Result<()> {
    let events: Vec<ArrivalEvent> =
        store::read_partition(&config.arrivals_dir(), store::DAY_KEY, partition)
            .context("reading arrivals partition")?;
    let clean = clean_arrivals(events, stops);

    let route_names = discover_route_names(&clean);
    store::write_partition(
        &config.route_names_dir(),
        store::DAY_KEY,
        partition,
        &route_names,
        config.gzip,
    )
    .context("writing route-name partition")?;

    // Canonical directions consider the entire recorded history, not just
    // the partition being derived.
    let history = read_all_route_names(&config.route_names_dir())?;
    let directions = CanonicalDirections::from_records(&history);

    let legs = derive_legs(&clean, &directions);
    store::write_partition(
        &config.legs_dir(),
        store::DAY_KEY,
        partition,
        &legs,
        config.gzip,
    )
    .context("writing legs partition")?;

    info!(
        clean_arrivals = clean.len(),
        legs = legs.len(),
        "Leg partition written"
    );
    Ok(())
}

fn read_all_route_names(dir: &Path) -> Result<Vec<RouteName>> {
    let mut records = Vec::new();
    for partition in store::list_partitions(dir, store::DAY_KEY)? {
        let mut rows: Vec<RouteName> = store::read_partition(dir, store::DAY_KEY, partition)?;
        records.append(&mut rows);
    }
    Ok(records)
}

/// Aggregates one month partition of legs into LegStat rows.
#[tracing::instrument(skip(config), fields(month = %month))]
fn aggregate_stat_partition(config: &JobConfig, month: NaiveDate) -> Result<()> {
    let legs_dir = config.legs_dir();
    let mut legs: Vec<Leg> = Vec::new();
    for partition in partitioning::available_daily(&legs_dir)? {
        if partitioning::truncate_to_month(partition) != month {
            continue;
        }
        let mut rows: Vec<Leg> = store::read_partition(&legs_dir, store::DAY_KEY, partition)
            .context("reading legs partition")?;
        legs.append(&mut rows);
    }

    let rows = aggregate_month(&legs, month);
    store::write_partition(
        &config.leg_stats_dir(),
        store::MONTH_KEY,
        month,
        &rows,
        config.gzip,
    )
    .context("writing leg-stats partition")?;

    info!(legs = legs.len(), groups = rows.len(), "Stats partition written");
    Ok(())
}

/// dataSource → most recent human-readable name, for the serving layer.
fn write_datasources(config: &JobConfig) -> Result<()> {
    let arrivals_dir = config.arrivals_dir();
    let mut latest: BTreeMap<String, (NaiveDate, String)> = BTreeMap::new();
    for partition in partitioning::available_daily(&arrivals_dir)? {
        let events: Vec<ArrivalEvent> =
            store::read_partition(&arrivals_dir, store::DAY_KEY, partition)?;
        for event in events {
            let candidate = (event.operating_date, event.data_source_name);
            latest
                .entry(event.data_source)
                .and_modify(|current| {
                    if candidate.0 >= current.0 {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate);
        }
    }

    let names: BTreeMap<String, String> = latest
        .into_iter()
        .map(|(source, (_, name))| (source, name))
        .collect();
    store::write_json(&config.root.join("datasources.json"), &names)?;
    info!(datasources = names.len(), "Datasource lookup written");
    Ok(())
}

/// Distinct (dataSource, lineRef, stop pair) rows, for the serving layer.
fn write_stop_lines(config: &JobConfig) -> Result<()> {
    let legs_dir = config.legs_dir();
    let mut pairs: BTreeSet<StopLine> = BTreeSet::new();
    for partition in partitioning::available_daily(&legs_dir)? {
        let legs: Vec<Leg> = store::read_partition(&legs_dir, store::DAY_KEY, partition)?;
        for leg in legs {
            pairs.insert(StopLine {
                data_source: leg.data_source,
                line_ref: leg.line_ref,
                from_stop: leg.from_stop,
                to_stop: leg.to_stop,
            });
        }
    }

    let rows: Vec<StopLine> = pairs.into_iter().collect();
    store::write_csv(&config.root.join("stop_lines.csv"), &rows)?;
    info!(stop_lines = rows.len(), "Stop-line mapping written");
    Ok(())
}
