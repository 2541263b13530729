use airquality_core::{
    Config, Coordinates, EpaClient, RankedStation, SelectedStation, build_directory,
    geocode::{Geocoder, NOMINATIM_URL},
};
use anyhow::{Context, Result};
use inquire::{CustomType, Password, Select, Text};
use std::fmt;

/// Entry in the station picker.
struct StationChoice(RankedStation);

impl fmt::Display for StationChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.1} km)", self.0.station.name, self.0.distance_km)
    }
}

/// Interactive setup: API key, location, then a distance-sorted station list.
pub async fn run(replace: bool) -> Result<()> {
    let mut config = Config::load()?;

    // Fail before prompting if the selection could never be saved.
    if let (Some(existing), false) = (&config.station, replace) {
        anyhow::bail!(
            "Station '{}' is already configured; only one station is supported.\n\
             Hint: run `airquality configure --replace` to switch stations.",
            existing.name
        );
    }

    let api_key = Password::new("EPA Victoria API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(&api_key);

    let location = prompt_location(config.location).await?;

    let client = EpaClient::new(&api_key.replace(' ', ""), &config.base_url)?;
    let directory = build_directory(&client, location)
        .await
        .context("Failed to build the station directory")?;

    let choices: Vec<StationChoice> = directory.into_iter().map(StationChoice).collect();
    let StationChoice(choice) = Select::new("Monitoring station:", choices)
        .with_page_size(10)
        .prompt()
        .context("No station selected")?;

    let selected = SelectedStation {
        id: choice.station.id.clone(),
        name: choice.station.name.clone(),
    };
    config.select_station(selected, location, replace)?;
    config.save()?;

    println!(
        "Saved {} ({:.1} km away) to {}",
        choice.station.name,
        choice.distance_km,
        Config::config_file_path()?.display()
    );
    Ok(())
}

async fn prompt_location(current: Option<Coordinates>) -> Result<Coordinates> {
    const BY_ADDRESS: &str = "Search by address";
    const BY_COORDS: &str = "Enter latitude/longitude";

    let mut options = vec![BY_ADDRESS, BY_COORDS];
    if current.is_some() {
        options.insert(0, "Keep current location");
    }

    let mode = Select::new("Location:", options)
        .prompt()
        .context("No location mode selected")?;

    match (mode, current) {
        (BY_ADDRESS, _) => {
            let address = Text::new("Address:").prompt().context("Failed to read address")?;
            let place = Geocoder::new(NOMINATIM_URL)?.search(&address).await?;
            println!("Using {} ({})", place.display_name, place.location);
            Ok(place.location)
        }
        (BY_COORDS, _) | (_, None) => {
            let latitude: f64 = CustomType::new("Latitude:")
                .prompt()
                .context("Failed to read latitude")?;
            let longitude: f64 = CustomType::new("Longitude:")
                .prompt()
                .context("Failed to read longitude")?;
            Ok(Coordinates::new(latitude, longitude)?)
        }
        (_, Some(location)) => Ok(location),
    }
}
