use anyhow::Result;
use log::{error, info, warn};
use std::fs::File;
use std::io::Write;
use std::time::Instant;

use multipac_analysis::analysis::build_report;
use multipac_analysis::classify::classify;
use multipac_analysis::geometry::CollisionGeometry;
use multipac_analysis::population::PopulationSeries;
use multipac_analysis::records::{read_mesh, read_records};
use multipac_analysis::store::TrajectoryStore;
use multipac_common::{AnalysisConfig, AnalysisError, AnalysisReport, GrowthMetrics};

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting multipactor analysis...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = AnalysisConfig::load(&config_path)?;

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Load Inputs ---
    let start_time = Instant::now();
    let records = read_records(&config.input.records)?;
    info!("Read {} particle records from '{}'.", records.len(), config.input.records);
    let mesh = read_mesh(&config.input.mesh)?;
    info!("Read {} mesh triangles from '{}'.", mesh.len(), config.input.mesh);

    // --- Build Trajectory Store ---
    let store = TrajectoryStore::load(&records, config.geometry.time_tolerance)?;
    info!(
        "Trajectory store holds {} particles over [{:.3}, {:.3}] ns.",
        store.len(),
        store.run_start(),
        store.max_time()
    );

    // --- Population Growth Fit ---
    let series = PopulationSeries::from_store(&store);
    let metrics: Option<GrowthMetrics> = match series.fit_growth(&config.fit) {
        Ok(metrics) => {
            info!(
                "Growth fit: rate {:.4} 1/ns, residual {:.4}, region [{:.3}, {:.3}] ns, order {:?}.",
                metrics.rate, metrics.residual, metrics.region.0, metrics.region.1, metrics.order
            );
            Some(metrics)
        }
        Err(AnalysisError::InsufficientData { reason }) => {
            info!("No multipactor: {}", reason);
            None
        }
        Err(e) => {
            error!("Growth fit failed: {}", e);
            anyhow::bail!("Growth fit failed.");
        }
    };

    // --- Collision Classification ---
    let geometry = CollisionGeometry::build(&mesh, config.geometry.epsilon)?;
    let classification = classify(&store, &geometry);
    info!(
        "Classification: {} collided, {} escaped, {} alive at end.",
        classification.collisions.len(),
        classification.escaped.len(),
        classification.alive_at_end.len()
    );

    // --- Assemble Report ---
    let report = build_report(
        &store,
        &series,
        metrics.as_ref(),
        &classification,
        geometry.len(),
        config.output.save_trajectories,
    );
    if report.multipactor_detected {
        info!(
            "Multipactor detected (rate {:.4} 1/ns, order {:?}).",
            report.growth_rate.unwrap_or(0.0),
            report.multipactor_order
        );
    } else {
        info!("No multipactor detected.");
    }
    info!(
        "Analysis finished in {:.3} seconds.",
        start_time.elapsed().as_secs_f64()
    );

    // --- Save Report ---
    save_report(&config, &report)?;

    if config.output.save_distributions {
        save_distributions(&config, &report)?;
    } else {
        info!("Skipping distribution CSV export as per config.");
    }

    info!("Analysis Complete.");
    Ok(())
}

/// Writes the report in the configured serialization format.
fn save_report(config: &AnalysisConfig, report: &AnalysisReport) -> Result<()> {
    let output_format = config.output.format.as_deref().unwrap_or("json");

    match output_format {
        "bincode" => {
            // Binary format (much more compact)
            let filename = format!("{}_report.bin", config.output.base_filename);
            match File::create(&filename) {
                Ok(file) => match bincode::serialize_into(file, report) {
                    Ok(_) => info!("Report saved to {} (binary format)", filename),
                    Err(e) => error!("Error serializing report to bincode: {}", e),
                },
                Err(e) => error!("Error creating report file '{}': {}", filename, e),
            }
        }
        "messagepack" => {
            // MessagePack format (compact and cross-platform)
            let filename = format!("{}_report.msgpack", config.output.base_filename);
            match &mut File::create(&filename) {
                Ok(file) => match rmp_serde::encode::write(file, report) {
                    Ok(_) => info!("Report saved to {} (MessagePack format)", filename),
                    Err(e) => error!("Error serializing report to MessagePack: {}", e),
                },
                Err(e) => error!("Error creating report file '{}': {}", filename, e),
            }
        }
        other => {
            if other != "json" {
                warn!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_report.json", config.output.base_filename);
            match File::create(&filename) {
                Ok(mut file) => match serde_json::to_string(report) {
                    Ok(json_string) => {
                        if let Err(e) = file.write_all(json_string.as_bytes()) {
                            error!("Error writing report JSON to file '{}': {}", filename, e);
                        } else {
                            info!("Report saved to {}", filename);
                        }
                    }
                    Err(e) => error!("Error serializing report to JSON: {}", e),
                },
                Err(e) => error!("Error creating report file '{}': {}", filename, e),
            }
        }
    }
    Ok(())
}

/// Writes the impact and emission distributions as flat CSV files.
fn save_distributions(config: &AnalysisConfig, report: &AnalysisReport) -> Result<()> {
    let filename = format!("{}_impacts.csv", config.output.base_filename);
    match csv::Writer::from_path(&filename) {
        Ok(mut writer) => {
            writer.write_record(["impact_energy_ev", "impact_angle_deg"])?;
            for (energy, angle) in report
                .impact_energies_ev
                .iter()
                .zip(&report.impact_angles_deg)
            {
                writer.write_record(&[format!("{:.4}", energy), format!("{:.4}", angle)])?;
            }
            writer.flush()?;
            info!("Impact distributions saved to {}", filename);
        }
        Err(e) => error!("Error saving CSV file '{}': {}", filename, e),
    }

    let filename = format!("{}_emissions.csv", config.output.base_filename);
    match csv::Writer::from_path(&filename) {
        Ok(mut writer) => {
            writer.write_record(["emission_energy_ev"])?;
            for energy in &report.emission_energies_ev {
                writer.write_record(&[format!("{:.4}", energy)])?;
            }
            writer.flush()?;
            info!("Emission distribution saved to {}", filename);
        }
        Err(e) => error!("Error saving CSV file '{}': {}", filename, e),
    }

    Ok(())
}
