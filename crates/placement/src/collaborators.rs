//! External collaborators the map controller consumes.
//!
//! Identity, device location and image selection are platform services.
//! The controller only sees these traits; the implementations here are
//! in-process stand-ins used by the demo binary and the tests.

use foundation::ids::UserId;
use foundation::math::Coordinate;
use markers::remote::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Source of the signed-in user.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;

    /// Notified whenever the signed-in user changes.
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

/// Identity provider driven by explicit sign-in and sign-out calls.
pub struct StaticIdentity {
    current: watch::Sender<Option<UserId>>,
}

impl StaticIdentity {
    pub fn signed_out() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn signed_in(user: UserId) -> Self {
        let (current, _) = watch::channel(Some(user));
        Self { current }
    }

    pub fn sign_in(&self, user: UserId) {
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        self.current.send_replace(None);
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.current.subscribe()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    Unavailable(String),
    Geocoder(String),
}

impl std::fmt::Display for LocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationError::Unavailable(msg) => write!(f, "position unavailable: {msg}"),
            LocationError::Geocoder(msg) => write!(f, "reverse geocoding failed: {msg}"),
        }
    }
}

impl std::error::Error for LocationError {}

/// A reverse-geocoded place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl PlaceAddress {
    /// Formats as `"{street} {city}, {region}, {country}"`, leaving out
    /// missing parts.
    pub fn format(&self) -> String {
        let head = [self.street.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        [Some(head.as_str()), self.region.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Device location services.
pub trait LocationProvider: Send + Sync {
    fn request_permission(&self) -> BoxFuture<'_, Permission>;

    fn current_position(&self) -> BoxFuture<'_, Result<Coordinate, LocationError>>;

    /// `Ok(None)` when the geocoder knows no place at `at`.
    fn reverse_geocode(
        &self,
        at: Coordinate,
    ) -> BoxFuture<'_, Result<Option<PlaceAddress>, LocationError>>;
}

/// Location provider with a fixed position and an optional fixed address.
pub struct FixedLocation {
    permission: Permission,
    position: Mutex<Coordinate>,
    address: Mutex<Option<PlaceAddress>>,
    geocoder_fails: bool,
}

impl FixedLocation {
    pub fn new(position: Coordinate) -> Self {
        Self {
            permission: Permission::Granted,
            position: Mutex::new(position),
            address: Mutex::new(None),
            geocoder_fails: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: Permission::Denied,
            ..Self::new(Coordinate::new_unchecked(0.0, 0.0))
        }
    }

    pub fn with_address(self, address: PlaceAddress) -> Self {
        *self.address.lock() = Some(address);
        self
    }

    pub fn with_failing_geocoder(mut self) -> Self {
        self.geocoder_fails = true;
        self
    }

    pub fn move_to(&self, position: Coordinate) {
        *self.position.lock() = position;
    }
}

impl LocationProvider for FixedLocation {
    fn request_permission(&self) -> BoxFuture<'_, Permission> {
        let permission = self.permission;
        Box::pin(async move { permission })
    }

    fn current_position(&self) -> BoxFuture<'_, Result<Coordinate, LocationError>> {
        let position = *self.position.lock();
        Box::pin(async move { Ok(position) })
    }

    fn reverse_geocode(
        &self,
        _at: Coordinate,
    ) -> BoxFuture<'_, Result<Option<PlaceAddress>, LocationError>> {
        let result = if self.geocoder_fails {
            Err(LocationError::Geocoder("geocoder offline".to_string()))
        } else {
            Ok(self.address.lock().clone())
        };
        Box::pin(async move { result })
    }
}

/// Photo selection. Returns the local URI of the chosen image, or `None`
/// when the user cancels.
pub trait ImagePicker: Send + Sync {
    fn pick_image(&self) -> BoxFuture<'_, Option<String>>;
}

/// Picker that always cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

impl ImagePicker for NoImages {
    fn pick_image(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async { None })
    }
}

/// Picker that always returns the same URI.
#[derive(Debug, Clone)]
pub struct FixedImage(pub String);

impl ImagePicker for FixedImage {
    fn pick_image(&self) -> BoxFuture<'_, Option<String>> {
        let uri = self.0.clone();
        Box::pin(async move { Some(uri) })
    }
}
