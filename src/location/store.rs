//! SQLite-backed location table at ~/.geoloc/locations.sqlite.
//!
//! Locations are geocoded lazily: saving a record whose coordinates are
//! missing or older than `max_age` refreshes it first. Spatial queries are a
//! plain latitude/longitude range scan; there is no spatial index.

use super::record::Location;
use super::types::{LatLon, StoreError};
use crate::field::{DictionaryField, Lookup};
use crate::geocoding::{Geocoder, Provider};
use crate::distance::Units;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rough miles per degree, used only to size the pre-filter box.
const MILES_PER_DEGREE: f64 = 75.0;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS locations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    query         TEXT    NOT NULL,
    friendly_name TEXT,
    provider      TEXT,
    geocoder      TEXT    NOT NULL,
    response_data TEXT    NOT NULL,
    latitude      REAL    NOT NULL DEFAULT 0,
    longitude     REAL    NOT NULL DEFAULT 0,
    refreshed     TEXT,
    created       TEXT,
    is_public     INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS locations_latitude ON locations (latitude);
CREATE INDEX IF NOT EXISTS locations_longitude ON locations (longitude);
";

const SELECT: &str = "SELECT id, query, friendly_name, provider, geocoder, response_data, \
                      latitude, longitude, refreshed, created, is_public FROM locations";

/// The location table plus the geocoder used to fill it.
pub struct LocationStore {
    conn: Connection,
    geocoder: Geocoder,
    max_age: Duration,
}

impl LocationStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path, geocoder: Geocoder, max_age: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        debug!(path = %path.display(), "opening location store");
        Self::with_connection(Connection::open(path)?, geocoder, max_age)
    }

    pub fn open_in_memory(geocoder: Geocoder, max_age: Duration) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, geocoder, max_age)
    }

    fn with_connection(conn: Connection, geocoder: Geocoder, max_age: Duration) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            geocoder,
            max_age,
        })
    }

    pub fn geocoder(&self) -> &Geocoder {
        &self.geocoder
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    // ─── Writes ─────────────────────────────────────────────────

    /// Save `location`, geocoding it first if its coordinates are stale.
    pub fn save(&self, location: &mut Location) -> Result<(), StoreError> {
        self.save_at(location, Utc::now())
    }

    #[tracing::instrument(level = "debug", skip(self, location, now), fields(query = %location.query))]
    pub fn save_at(&self, location: &mut Location, now: DateTime<Utc>) -> Result<(), StoreError> {
        if location.query.trim().is_empty() {
            return Err(StoreError::EmptyQuery);
        }
        if location.created.is_none() {
            location.created = Some(now);
        }
        location.provider.get_or_insert(self.geocoder.default_provider());
        location.refresh_if_needed(&self.geocoder, self.max_age, now)?;
        self.write(location)
    }

    /// Re-geocode regardless of age, then save.
    pub fn refresh(&self, location: &mut Location) -> Result<(), StoreError> {
        self.refresh_at(location, Utc::now())
    }

    pub fn refresh_at(&self, location: &mut Location, now: DateTime<Utc>) -> Result<(), StoreError> {
        location.refresh(&self.geocoder, now)?;
        if location.created.is_none() {
            location.created = Some(now);
        }
        self.write(location)
    }

    /// Refresh every expired location. Failures are logged and skipped;
    /// returns how many were refreshed.
    pub fn refresh_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut refreshed = 0;
        for mut location in self.expired(now)? {
            match location.refresh(&self.geocoder, now) {
                Ok(()) => {
                    self.write(&mut location)?;
                    refreshed += 1;
                }
                Err(e) => warn!(id = ?location.id, error = %e, "skipping location"),
            }
        }
        info!(refreshed, "expired locations refreshed");
        Ok(refreshed)
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let deleted = self.conn.execute("DELETE FROM locations WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id));
        }
        info!(id, "location deleted");
        Ok(())
    }

    fn write(&self, location: &mut Location) -> Result<(), StoreError> {
        match location.id {
            Some(id) => {
                let updated = self.conn.execute(
                    "UPDATE locations SET query = ?1, friendly_name = ?2, provider = ?3, \
                     geocoder = ?4, response_data = ?5, latitude = ?6, longitude = ?7, \
                     refreshed = ?8, created = ?9, is_public = ?10 WHERE id = ?11",
                    params![
                        location.query,
                        location.friendly_name,
                        location.provider,
                        location.geocoder,
                        location.response_data,
                        location.latitude,
                        location.longitude,
                        location.refreshed,
                        location.created,
                        location.is_public,
                        id,
                    ],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound(id));
                }
                debug!(id, "location updated");
            }
            None => {
                self.conn.execute(
                    "INSERT INTO locations (query, friendly_name, provider, geocoder, \
                     response_data, latitude, longitude, refreshed, created, is_public) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        location.query,
                        location.friendly_name,
                        location.provider,
                        location.geocoder,
                        location.response_data,
                        location.latitude,
                        location.longitude,
                        location.refreshed,
                        location.created,
                        location.is_public,
                    ],
                )?;
                let id = self.conn.last_insert_rowid();
                location.id = Some(id);
                info!(id, query = %location.query, "location added");
            }
        }
        Ok(())
    }

    // ─── Reads ──────────────────────────────────────────────────

    pub fn get(&self, id: i64) -> Result<Location, StoreError> {
        self.conn
            .query_row(&format!("{} WHERE id = ?1", SELECT), [id], from_row)
            .optional()?
            .ok_or(StoreError::NotFound(id))
    }

    pub fn all(&self) -> Result<Vec<Location>, StoreError> {
        self.select("ORDER BY id", ())
    }

    /// The first location with this exact query, or a new geocoded and saved
    /// one. The flag is true when the location was created.
    pub fn get_or_create(&self, query: &str) -> Result<(Location, bool), StoreError> {
        let existing = self
            .conn
            .query_row(
                &format!("{} WHERE query = ?1 ORDER BY id LIMIT 1", SELECT),
                [query],
                from_row,
            )
            .optional()?;
        if let Some(location) = existing {
            return Ok((location, false));
        }
        let mut location = Location::new(query);
        self.save(&mut location)?;
        Ok((location, true))
    }

    pub fn public(&self) -> Result<Vec<Location>, StoreError> {
        self.select("WHERE is_public = 1 ORDER BY id", ())
    }

    /// Locations never refreshed, or refreshed at or before `now - max_age`.
    ///
    /// The cutoff is inclusive, so a location exactly `max_age` old is listed
    /// here even though [`Location::is_expired`] still reports it fresh.
    pub fn expired(&self, now: DateTime<Utc>) -> Result<Vec<Location>, StoreError> {
        let cutoff = chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => {
                self.select("WHERE refreshed IS NULL OR refreshed <= ?1 ORDER BY id", [cutoff])
            }
            None => self.select("WHERE refreshed IS NULL ORDER BY id", ()),
        }
    }

    /// Locations inside the box spanned by the north-west and south-east
    /// corners, edges included.
    pub fn within_bounds(
        &self,
        north_west: &impl LatLon,
        south_east: &impl LatLon,
    ) -> Result<Vec<Location>, StoreError> {
        let (north, west) = north_west.lat_lon();
        let (south, east) = south_east.lat_lon();
        self.select(
            "WHERE latitude BETWEEN ?1 AND ?2 AND longitude BETWEEN ?3 AND ?4 ORDER BY id",
            [south, north, west, east],
        )
    }

    /// Other locations ordered by distance from `origin`, nearest first.
    ///
    /// With a radius, candidates are first narrowed to a square of
    /// `radius / 75` degrees around the origin and then filtered by exact
    /// distance. A degree of latitude is nearer 69 miles, so the square is
    /// smaller than the circle and can miss locations close to the edge of
    /// the radius. The origin itself and anything at exactly its coordinates
    /// are left out.
    #[tracing::instrument(level = "debug", skip(self, origin), fields(origin = %origin.name()))]
    pub fn by_proximity_to_location(
        &self,
        origin: &Location,
        radius_miles: Option<f64>,
    ) -> Result<Vec<Location>, StoreError> {
        let (lat, lon) = origin.coords_tuple();
        let candidates = match radius_miles {
            Some(radius) => {
                let delta = radius / MILES_PER_DEGREE;
                self.select(
                    "WHERE latitude BETWEEN ?1 AND ?2 AND longitude BETWEEN ?3 AND ?4",
                    [lat - delta, lat + delta, lon - delta, lon + delta],
                )?
            }
            None => self.all()?,
        };
        debug!(candidates = candidates.len(), "pre-filtered");

        let mut nearby: Vec<(f64, Location)> = candidates
            .into_iter()
            .filter(|loc| !(loc.id.is_some() && loc.id == origin.id))
            .filter(|loc| loc.coords_tuple() != (lat, lon))
            .map(|loc| (origin.distance_between(&loc, Units::Miles), loc))
            .filter(|(miles, _)| radius_miles.map_or(true, |radius| *miles <= radius))
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(nearby.into_iter().map(|(_, loc)| loc).collect())
    }

    /// Locations whose stored response dictionary matches `lookup`.
    pub fn find_by_response_data(&self, lookup: &Lookup<DictionaryField>) -> Result<Vec<Location>, StoreError> {
        let (condition, values) = lookup.sql_condition("response_data")?;
        self.select(&format!("WHERE {} ORDER BY id", condition), params_from_iter(values))
    }

    fn select<P: rusqlite::Params>(&self, clause: &str, params: P) -> Result<Vec<Location>, StoreError> {
        let mut stmt = self.conn.prepare(&format!("{} {}", SELECT, clause))?;
        let locations = stmt
            .query_map(params, from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(locations)
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get("id")?,
        query: row.get("query")?,
        friendly_name: row.get("friendly_name")?,
        provider: row.get("provider")?,
        geocoder: row.get("geocoder")?,
        response_data: row.get("response_data")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        refreshed: row.get("refreshed")?,
        created: row.get("created")?,
        is_public: row.get("is_public")?,
    })
}

impl ToSql for Provider {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.short_name()))
    }
}

impl FromSql for Provider {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let name = value.as_str()?;
        Provider::from_short_name(name)
            .ok_or_else(|| FromSqlError::Other(format!("unknown geocoder '{}'", name).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::fixtures::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    const MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);

    fn store() -> (LocationStore, std::rc::Rc<std::cell::Cell<usize>>) {
        let (geocoder, calls) = city_geocoder();
        (LocationStore::open_in_memory(geocoder, MAX_AGE).unwrap(), calls)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn add(store: &LocationStore, query: &str) -> Location {
        let mut loc = Location::new(query);
        store.save_at(&mut loc, t0()).unwrap();
        loc
    }

    fn queries(locations: &[Location]) -> Vec<&str> {
        locations.iter().map(|l| l.query.as_str()).collect()
    }

    #[test]
    fn test_save_geocodes_and_assigns_id() {
        let (store, calls) = store();
        let loc = add(&store, "London");

        assert_eq!(calls.get(), 1);
        assert!(loc.id.is_some());
        assert_eq!(loc.created, Some(t0()));
        assert_eq!(loc.refreshed, Some(t0()));

        let stored = store.get(loc.id.unwrap()).unwrap();
        assert_eq!(stored.id, loc.id);
        assert_eq!(stored.query, "London");
        assert_eq!(stored.provider, Some(Provider::GeoNames));
        assert_eq!(stored.created, loc.created);
        assert_eq!(stored.refreshed, loc.refreshed);
        assert_eq!(stored.coords_tuple(), LONDON);
        assert_eq!(stored.response_data.get_str("name"), Some("London"));
    }

    #[test]
    fn test_save_again_is_an_update() {
        let (store, calls) = store();
        let mut loc = add(&store, "London");
        loc.set_friendly_name("The Smoke");
        loc.is_public = false;
        store.save_at(&mut loc, t0() + chrono::Duration::days(1)).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(store.all().unwrap().len(), 1);
        let stored = store.get(loc.id.unwrap()).unwrap();
        assert_eq!(stored.name(), "The Smoke");
        assert!(!stored.is_public);
    }

    #[test]
    fn test_save_rejects_empty_query() {
        let (store, calls) = store();
        let mut loc = Location::new("  ");
        assert!(matches!(store.save(&mut loc), Err(StoreError::EmptyQuery)));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_save_unknown_place_fails() {
        let (store, _) = store();
        let mut loc = Location::new("Atlantis");
        let err = store.save(&mut loc).unwrap_err();
        assert!(matches!(err, StoreError::Geocoding(_)));
        assert_eq!(loc.id, None);
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn test_get_and_delete_missing() {
        let (store, _) = store();
        assert!(matches!(store.get(42), Err(StoreError::NotFound(42))));
        assert!(matches!(store.delete(42), Err(StoreError::NotFound(42))));

        let loc = add(&store, "Darwin");
        store.delete(loc.id.unwrap()).unwrap();
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn test_get_or_create() {
        let (store, calls) = store();
        let (first, created) = store.get_or_create("Brussels").unwrap();
        assert!(created);
        assert_eq!(first.coords_tuple(), BRUSSELS);

        let (second, created) = store.get_or_create("Brussels").unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_get_or_create_uses_default_geocoder() {
        let (geocoder, _) = city_geocoder_with(Provider::Google);
        let store = LocationStore::open_in_memory(geocoder, MAX_AGE).unwrap();

        let (loc, created) = store.get_or_create("Brussels").unwrap();
        assert!(created);
        assert_eq!(loc.provider, Some(Provider::Google));
        assert_eq!(loc.coords_tuple(), BRUSSELS);
        assert_eq!(loc.response_data.get_str("code"), Some("200"));

        let stored = store.get(loc.id.unwrap()).unwrap();
        assert_eq!(stored.provider, Some(Provider::Google));
    }

    #[test]
    fn test_save_uses_configured_default_geocoder() {
        let (geocoder, _) = city_geocoder_with(Provider::Yahoo);
        let store = LocationStore::open_in_memory(geocoder, MAX_AGE).unwrap();

        let loc = add(&store, "Darwin");
        assert_eq!(loc.provider, Some(Provider::Yahoo));
        assert_eq!(loc.coords_tuple(), DARWIN);
        assert_eq!(loc.geocoder.as_ref().unwrap().provider, Provider::Yahoo);
        assert_eq!(store.get(loc.id.unwrap()).unwrap().provider, Some(Provider::Yahoo));
    }

    #[test]
    fn test_mixed_providers_share_a_store() {
        let (store, calls) = store();
        let mut yahoo = Location::new("London").with_provider(Provider::Yahoo);
        store.save_at(&mut yahoo, t0()).unwrap();
        let geonames = add(&store, "Sydney");

        let stored: Vec<_> = store.all().unwrap();
        assert_eq!(
            stored.iter().map(|l| l.provider).collect::<Vec<_>>(),
            vec![Some(Provider::Yahoo), Some(Provider::GeoNames)]
        );
        assert_eq!(stored[0].coords_tuple(), LONDON);
        assert_eq!(stored[0].response_data.get_str("city"), Some("London"));
        assert_eq!(stored[1].coords_tuple(), SYDNEY);
        assert_eq!(stored[1].response_data.get_str("name"), Some("Sydney"));
        assert_eq!(geonames.provider, Some(Provider::GeoNames));

        // Each record is refreshed through its own provider.
        assert_eq!(store.refresh_expired(t0() + chrono::Duration::days(60)).unwrap(), 2);
        assert_eq!(calls.get(), 4);
        let refreshed = store.get(yahoo.id.unwrap()).unwrap();
        assert_eq!(refreshed.geocoder.as_ref().unwrap().provider, Provider::Yahoo);
        assert_eq!(refreshed.coords_tuple(), LONDON);
    }

    #[test]
    fn test_public() {
        let (store, _) = store();
        add(&store, "London");
        let mut hidden = Location::new("Sydney");
        hidden.is_public = false;
        store.save_at(&mut hidden, t0()).unwrap();

        assert_eq!(queries(&store.public().unwrap()), vec!["London"]);
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn test_expired_and_refresh_expired() {
        let (store, calls) = store();
        add(&store, "London");
        let mut recent = Location::new("Sydney");
        store.save_at(&mut recent, t0() + chrono::Duration::days(20)).unwrap();

        assert!(store.expired(t0() + chrono::Duration::days(29)).unwrap().is_empty());
        let boundary = store.expired(t0() + chrono::Duration::days(30)).unwrap();
        assert_eq!(queries(&boundary), vec!["London"]);
        // Inclusive cutoff: listed, though the record itself is not yet stale.
        assert!(!boundary[0].is_expired(MAX_AGE, t0() + chrono::Duration::days(30)));
        assert_eq!(queries(&store.expired(t0() + chrono::Duration::days(60)).unwrap()), vec!["London", "Sydney"]);

        let later = t0() + chrono::Duration::days(45);
        assert_eq!(store.refresh_expired(later).unwrap(), 1);
        assert_eq!(calls.get(), 3);
        assert!(store.expired(later).unwrap().is_empty());
    }

    #[test]
    fn test_forced_refresh() {
        let (store, calls) = store();
        let mut loc = add(&store, "Wellington");
        let later = t0() + chrono::Duration::hours(1);
        store.refresh_at(&mut loc, later).unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(store.get(loc.id.unwrap()).unwrap().refreshed, Some(later));
    }

    #[test]
    fn test_within_bounds() {
        let (store, _) = store();
        for city in ["London", "Birmingham", "Brussels", "Sydney", "New York"] {
            add(&store, city);
        }

        // Corners are inclusive in the table query.
        let found = store.within_bounds(&BIRMINGHAM, &BRUSSELS).unwrap();
        assert_eq!(queries(&found), vec!["London", "Birmingham", "Brussels"]);

        let found = store.within_bounds(&DARWIN, &WELLINGTON).unwrap();
        assert_eq!(queries(&found), vec!["Sydney"]);

        assert!(store.within_bounds(&(10.0, 10.0), &(0.0, 20.0)).unwrap().is_empty());
    }

    #[test]
    fn test_proximity_ordering() {
        let (store, _) = store();
        let london = add(&store, "London");
        for city in ["New York", "Brussels", "Birmingham"] {
            add(&store, city);
        }
        // Same coordinates as the origin: excluded.
        add(&store, "London");

        let nearby = store.by_proximity_to_location(&london, None).unwrap();
        assert_eq!(queries(&nearby), vec!["Birmingham", "Brussels", "New York"]);
    }

    #[test]
    fn test_proximity_radius() {
        let (store, _) = store();
        let london = add(&store, "London");
        for city in ["Brussels", "Birmingham", "Sydney"] {
            add(&store, city);
        }

        let nearby = store.by_proximity_to_location(&london, Some(150.0)).unwrap();
        assert_eq!(queries(&nearby), vec!["Birmingham"]);

        let nearby = store.by_proximity_to_location(&london, Some(350.0)).unwrap();
        assert_eq!(queries(&nearby), vec!["Birmingham", "Brussels"]);

        let nearby = store.by_proximity_to_location(&london, Some(50.0)).unwrap();
        assert!(nearby.is_empty());
    }

    #[test]
    fn test_proximity_box_can_miss_radius_edge() {
        let (store, calls) = store();
        let london = add(&store, "London");
        // About 145 miles due north, outside the 2 degree pre-filter box.
        let mut north = Location::new("Near Scarborough");
        north.latitude = 53.6;
        north.longitude = LONDON.1;
        north.refreshed = Some(t0());
        store.save_at(&mut north, t0()).unwrap();
        assert_eq!(calls.get(), 1);

        let miles = london.distance_between(&north, Units::Miles);
        assert!(miles < 150.0, "{}", miles);
        assert!(store.by_proximity_to_location(&london, Some(150.0)).unwrap().is_empty());
        assert_eq!(
            queries(&store.by_proximity_to_location(&london, None).unwrap()),
            vec!["Near Scarborough"]
        );
    }

    #[test]
    fn test_find_by_response_data() {
        let (store, _) = store();
        let london = add(&store, "London");
        add(&store, "Sydney");

        let exact = Lookup::Exact(london.response_data.clone());
        assert_eq!(queries(&store.find_by_response_data(&exact).unwrap()), vec!["London"]);

        let other: DictionaryField = [("name", json!("Nowhere"))].into_iter().collect();
        let any = Lookup::In(vec![other, london.response_data.clone()]);
        assert_eq!(queries(&store.find_by_response_data(&any).unwrap()), vec!["London"]);

        let contains = Lookup::Other("contains".into());
        assert!(matches!(
            store.find_by_response_data(&contains),
            Err(StoreError::Field(_))
        ));
    }

    #[test]
    fn test_persists_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("locations.sqlite");

        let id = {
            let (geocoder, _) = city_geocoder();
            let store = LocationStore::open(&path, geocoder, MAX_AGE).unwrap();
            add(&store, "New York").id.unwrap()
        };

        let (geocoder, calls) = city_geocoder();
        let store = LocationStore::open(&path, geocoder, MAX_AGE).unwrap();
        let loc = store.get(id).unwrap();
        assert_eq!(loc.coords_tuple(), NEW_YORK);
        assert_eq!(loc.geocoder.as_ref().unwrap().query, "New York");
        assert_eq!(calls.get(), 0);
    }
}
