use std::sync::Arc;

use clap::{Parser, Subcommand};
use foundation::ids::{MarkerId, UserId};
use foundation::math::{Coordinate, distance_km};
use foundation::time::Time;
use markers::memory::MemoryCollection;
use markers::store::MarkerStore;
use placement::collaborators::{FixedLocation, NoImages, PlaceAddress, StaticIdentity};
use placement::config::PlacementConfig;
use placement::controller::{Collaborators, MapController, PressOutcome};
use runtime::clock::ManualClock;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Incident map placement core tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted placement session against an in-memory collection
    Demo {
        /// User latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// User longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Signed-in user id
        #[arg(long, default_value = "demo-user")]
        user: String,
    },

    /// Print the haversine distance between two points
    Distance {
        #[arg(long, allow_hyphen_values = true)]
        from_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        from_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lon: f64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main(Args::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn real_main(args: Args) -> Result<(), String> {
    match args.command {
        Command::Demo { lat, lon, user } => cmd_demo(lat, lon, user).await,
        Command::Distance {
            from_lat,
            from_lon,
            to_lat,
            to_lon,
        } => cmd_distance(from_lat, from_lon, to_lat, to_lon),
    }
}

fn coordinate(lat: f64, lon: f64) -> Result<Coordinate, String> {
    Coordinate::new(lat, lon).map_err(|e| format!("invalid coordinate ({lat}, {lon}): {e}"))
}

fn cmd_distance(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> Result<(), String> {
    let a = coordinate(from_lat, from_lon)?;
    let b = coordinate(to_lat, to_lon)?;
    let km = distance_km(a, b);
    println!("{km:.6} km ({:.1} m)", km * 1000.0);
    Ok(())
}

async fn cmd_demo(lat: f64, lon: f64, user: String) -> Result<(), String> {
    let config = PlacementConfig::from_env();
    let here = coordinate(lat, lon)?;
    let east = coordinate(lat, lon + 0.0008)?;
    let beside_east = coordinate(lat, lon + 0.00085)?;
    let west = coordinate(lat, lon - 0.0008)?;
    let north_far = coordinate(lat + 0.002, lon)?;

    let db = Arc::new(MemoryCollection::new());
    let store = MarkerStore::new(db.clone(), config.collection_path.clone());
    let mut changes = store.changes();
    let _sync = store.spawn_sync();

    let clock = Arc::new(ManualClock::new(Time::now()));
    let location = FixedLocation::new(here).with_address(PlaceAddress {
        street: Some("1 Demo Street".to_string()),
        city: Some("Sampleton".to_string()),
        region: Some("Testshire".to_string()),
        country: Some("Nowhere".to_string()),
    });
    let cooldown = f64::from(config.cooldown_seconds);
    let mut controller = MapController::new(
        config,
        store,
        Collaborators {
            identity: Arc::new(StaticIdentity::signed_in(UserId::new(user))),
            location: Arc::new(location),
            images: Arc::new(NoImages),
            clock: clock.clone(),
        },
    );

    let status = controller.start().await;
    info!("map status: {status:?}");

    let first = place(&mut controller, east, "Pothole", "Deep pothole in the right lane").await?;

    clock.advance(cooldown + 1.0);
    report(&mut controller, "too close", beside_east).await;
    report(&mut controller, "out of range", north_far).await;

    place(&mut controller, west, "Broken street light", "Dark since Monday").await?;
    report(&mut controller, "during cooldown", east).await;

    if controller.press_marker(&first) {
        controller
            .set_title("Pothole (reported to council)")
            .map_err(|e| e.to_string())?;
        controller.submit().await.map_err(|e| e.to_string())?;
        info!("edited marker {first}");
    }
    drain(&mut controller);

    // Let the subscription catch up with the writes.
    let _ = changes.borrow_and_update();
    while db.documents(controller.store().path()).len() != controller.markers().len() {
        changes.changed().await.map_err(|e| e.to_string())?;
    }

    let alerts: Vec<_> = controller
        .alerts()
        .into_iter()
        .map(|a| {
            json!({
                "id": a.id.as_str(),
                "title": a.title,
                "description": a.description,
                "address": a.address,
                "createdAt": a.created_at,
                "ownerId": a.owner_id.as_str(),
            })
        })
        .collect();
    let out = serde_json::to_string_pretty(&json!({ "alerts": alerts }))
        .map_err(|e| format!("encode alerts: {e}"))?;
    println!("{out}");
    Ok(())
}

async fn place(
    controller: &mut MapController,
    at: Coordinate,
    title: &str,
    description: &str,
) -> Result<MarkerId, String> {
    match controller.press_location(at).await {
        PressOutcome::FormOpened => {}
        other => {
            drain(controller);
            return Err(format!("placing {title:?} at {at}: {other:?}"));
        }
    }
    controller.set_title(title).map_err(|e| e.to_string())?;
    controller
        .set_description(description)
        .map_err(|e| e.to_string())?;
    let id = controller.submit().await.map_err(|e| e.to_string())?;
    info!("placed {title:?} at {at} as {id}");
    drain(controller);
    Ok(id)
}

async fn report(controller: &mut MapController, label: &str, at: Coordinate) {
    let outcome = controller.press_location(at).await;
    info!("{label}: press at {at} -> {outcome:?}");
    if outcome == PressOutcome::FormOpened {
        warn!("{label}: expected a rejection");
        controller.close_form();
    }
    drain(controller);
}

fn drain(controller: &mut MapController) {
    for notice in controller.drain_notices() {
        println!("[{:?}] {}: {}", notice.kind, notice.title, notice.message);
    }
}
