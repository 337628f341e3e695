//! Recording Session Example
//!
//! Builds a small two-photon session container: acquisition series, a
//! hard link, a processing module, epochs with tags, and metadata. Then
//! reopens it to append an epoch and reads everything back.
//!
//! Run with: RUST_LOG=debug cargo run --example recording_session

use anyhow::Context;
use neurodata_db::container::Container;
use neurodata_db::entity::Placement;
use neurodata_db::metadata::keys;
use neurodata_db::ContainerReader;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Neurodata-DB Recording Session ===\n");

    let path = std::env::temp_dir().join("recording_session.nwb.json");

    // -------------------------------------------------------------------------
    // 1. Create the container
    // -------------------------------------------------------------------------
    println!("1. Creating container at {}...", path.display());

    let mut container = Container::builder(&path)
        .description("two-photon imaging, mouse V1, drifting gratings")
        .start_time("Sat Jul 04 2015 3:14:16")
        .overwrite(true)
        .create()
        .context("creating container")?;
    println!("   Identifier: {}", container.identifier()?);

    container.set_metadata(&keys::INSTITUTION, "Allen Institute for Brain Science")?;
    container.set_metadata(&keys::SPECIES, "Mus musculus")?;
    container.set_metadata(&keys::image_site_indicator("plane-0"), "GCaMP6f")?;
    container.set_metadata(&keys::image_site_channel_lambda("plane-0", "green"), "520nm")?;

    // -------------------------------------------------------------------------
    // 2. Acquisition: running speed plus a copy sharing its data
    // -------------------------------------------------------------------------
    println!("\n2. Writing acquisition series...");

    let speed = container.create_timeseries("TimeSeries", "running_speed", Placement::Acquisition)?;
    {
        let mut series = container.series(speed)?;
        series.set_data(vec![0.0, 1.2, 3.4, 2.2, 0.4], "cm/s", 1.0, 0.01)?;
        series.set_time_by_rate(0.0, 30.0)?;
        series.set_description("wheel encoder speed")?;
    }
    let filtered = container.create_timeseries("TimeSeries", "running_speed_view", Placement::Acquisition)?;
    container.link_field(filtered, "data", speed, "data")?;
    container.series(filtered)?.set_time_by_rate(0.0, 30.0)?;
    container.finalize(speed)?;
    container.finalize(filtered)?;

    let notes = container.create_timeseries("AnnotationSeries", "notes", Placement::Acquisition)?;
    container.add_annotation(notes, "grating off", 4.0)?;
    container.add_annotation(notes, "grating on", 1.0)?;
    container.finalize(notes)?;
    println!("   Finalized running_speed, running_speed_view (linked) and notes");

    // -------------------------------------------------------------------------
    // 3. Processing module with spike times
    // -------------------------------------------------------------------------
    println!("\n3. Writing processing module...");

    let module = container.create_module("spikes")?;
    container.set_module_description(module, "deconvolved events")?;
    let units = container.create_interface(module, "UnitTimes")?;
    container.unit_times(units)?.add_unit("cell-0", &[0.4, 1.9, 2.5], "soma", "deconvolution")?;
    container.unit_times(units)?.add_unit("cell-1", &[1.1], "soma", "deconvolution")?;
    container.finalize_interface(units)?;
    container.finalize_module(module)?;

    // -------------------------------------------------------------------------
    // 4. Epochs
    // -------------------------------------------------------------------------
    println!("\n4. Writing epochs...");

    let baseline = container.create_epoch("baseline", 0.0, 1.0)?;
    container.add_epoch_tag(baseline, "gray")?;
    let stimulus = container.create_epoch("stimulus", 1.0, 4.0)?;
    container.add_epoch_tag(stimulus, "grating")?;
    container.add_epoch_tag(stimulus, "drifting")?;
    container.close()?;

    // -------------------------------------------------------------------------
    // 5. Append a session
    // -------------------------------------------------------------------------
    println!("\n5. Appending a recovery epoch...");

    let mut container = Container::builder(&path).append()?;
    let recovery = container.create_epoch("recovery", 4.0, 6.0)?;
    container.add_epoch_tag(recovery, "gray")?;
    container.close()?;

    // -------------------------------------------------------------------------
    // 6. Read back
    // -------------------------------------------------------------------------
    println!("\n6. Reading back...");

    let reader = ContainerReader::open(&path)?;
    reader.verify_entity("acquisition/timeseries/notes", "AnnotationSeries")?;
    println!("   notes ancestry: {:?}", reader.ancestry("acquisition/timeseries/notes")?);
    println!(
        "   linked data: {:?}",
        reader.dataset("acquisition/timeseries/running_speed_view/data")?
    );
    println!("   epoch tags: {:?}", reader.aggregate_tags()?);
    println!("   modification log: {} entries", reader.modification_log()?.len());

    println!("\n=== Done ===");
    Ok(())
}
