//! Distance-ordered station directory for the setup wizard.

use crate::{
    error::{AirQualityError, Result},
    model::{Coordinates, RankedStation, Station},
    provider::StationProvider,
};

/// Mean earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Order stations nearest first. Stations at equal distance keep their
/// original relative order.
pub fn rank_by_distance(stations: Vec<Station>, reference: Coordinates) -> Vec<RankedStation> {
    let mut ranked: Vec<RankedStation> = stations
        .into_iter()
        .map(|station| RankedStation {
            distance_km: haversine_km(reference, station.location),
            station,
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

/// Fetch every station from the provider and rank it against `reference`.
pub async fn build_directory<P>(provider: &P, reference: Coordinates) -> Result<Vec<RankedStation>>
where
    P: StationProvider + ?Sized,
{
    let stations = provider.fetch_stations().await?;
    if stations.is_empty() {
        tracing::warn!("provider returned an empty station list");
        return Err(AirQualityError::NoStationsReturned);
    }

    let ranked = rank_by_distance(stations, reference);
    if let Some(first) = ranked.first() {
        tracing::info!(
            stations = ranked.len(),
            nearest = %first.station.name,
            distance_km = first.distance_km,
            "built station directory"
        );
    }
    Ok(ranked)
}

/// The single closest station to `reference`.
pub async fn nearest<P>(provider: &P, reference: Coordinates) -> Result<RankedStation>
where
    P: StationProvider + ?Sized,
{
    build_directory(provider, reference)
        .await?
        .into_iter()
        .next()
        .ok_or(AirQualityError::NoStationsReturned)
}
