//! Placement flow orchestration.
//!
//! `MapController` owns the flow state and drives the collaborators:
//!
//! ```text
//! Idle -> AwaitingAddress -> FormOpen -> Submitting -> Idle
//!   \______ press own marker ______/
//! ```
//!
//! Cooldown and placement rules are checked before leaving `Idle`, so a
//! rejected press never changes the flow state. Every user-facing message is
//! pushed to the notice bus.

use std::sync::Arc;

use foundation::ids::{MarkerId, UserId};
use foundation::math::Coordinate;
use markers::alerts::Alert;
use markers::marker::{Marker, MarkerInput, MarkerPatch};
use markers::store::{MarkerStore, StoreError};
use runtime::clock::Clock;
use runtime::event_bus::{Notice, NoticeBus, NoticeKind};
use runtime::session::Session;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::collaborators::{IdentityProvider, ImagePicker, LocationProvider, Permission};
use crate::config::PlacementConfig;
use crate::policy::{Decision, PlacementPolicy};

pub const ADDRESS_NOT_AVAILABLE: &str = "Address not available";

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MapStatus {
    /// Waiting for permission and the first position fix.
    Loading,
    Ready(Coordinate),
    /// Location permission denied or no position available.
    Unavailable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingAddress,
    FormOpen,
    Submitting,
}

/// Fields of the marker form, for a new marker or an edit of an own marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerForm {
    /// `Some` when editing a stored marker.
    pub editing: Option<MarkerId>,
    pub location: Coordinate,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
    pub owner_id: UserId,
    pub created_at: String,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Rejection {
    CooldownActive { remaining_seconds: u32 },
    OutOfRange { distance_km: f64 },
    TooCloseToExisting { distance_km: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PressOutcome {
    FormOpened,
    Rejected(Rejection),
    /// Map not ready or nobody signed in.
    Ignored,
    /// The press dismissed an open form.
    FormClosed,
}

#[derive(Debug)]
pub enum ControllerError {
    NoForm,
    /// The open form is for a new marker, so there is nothing to delete.
    NotEditing,
    NotSignedIn,
    Store(StoreError),
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerError::NoForm => write!(f, "no marker form is open"),
            ControllerError::NotEditing => {
                write!(f, "the open form is not editing a stored marker")
            }
            ControllerError::NotSignedIn => write!(f, "no user is signed in"),
            ControllerError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ControllerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControllerError::Store(e) => Some(e),
            _ => None,
        }
    }
}

/// Services the controller depends on.
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub location: Arc<dyn LocationProvider>,
    pub images: Arc<dyn ImagePicker>,
    pub clock: Arc<dyn Clock>,
}

pub struct MapController {
    config: PlacementConfig,
    policy: PlacementPolicy,
    store: MarkerStore,
    identity: Arc<dyn IdentityProvider>,
    location: Arc<dyn LocationProvider>,
    images: Arc<dyn ImagePicker>,
    clock: Arc<dyn Clock>,
    session: Option<Session>,
    status: MapStatus,
    flow: FlowState,
    form: Option<MarkerForm>,
    notices: NoticeBus,
}

impl MapController {
    pub fn new(config: PlacementConfig, store: MarkerStore, deps: Collaborators) -> Self {
        let mut controller = Self {
            policy: PlacementPolicy::from_config(&config),
            config,
            store,
            identity: deps.identity,
            location: deps.location,
            images: deps.images,
            clock: deps.clock,
            session: None,
            status: MapStatus::Loading,
            flow: FlowState::Idle,
            form: None,
            notices: NoticeBus::new(),
        };
        controller.refresh_identity();
        controller
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    pub fn status(&self) -> MapStatus {
        self.status
    }

    pub fn flow(&self) -> FlowState {
        self.flow
    }

    pub fn form(&self) -> Option<&MarkerForm> {
        self.form.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.store.markers()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.store.alerts()
    }

    /// Notices not yet drained. The queue is unbounded, so the UI should
    /// call [`MapController::drain_notices`] after showing them.
    pub fn notices(&self) -> &[Notice] {
        self.notices.notices()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    /// Sign-in changes; call [`MapController::refresh_identity`] when it fires.
    pub fn identity_changes(&self) -> watch::Receiver<Option<UserId>> {
        self.identity.subscribe()
    }

    /// Requests location access and the initial position.
    pub async fn start(&mut self) -> MapStatus {
        self.refresh_identity();
        self.status = match self.location.request_permission().await {
            Permission::Denied => {
                warn!("location permission denied");
                self.notify(
                    NoticeKind::PermissionDenied,
                    "Permission denied",
                    "Permission to access location was denied.",
                );
                MapStatus::Unavailable
            }
            Permission::Granted => match self.location.current_position().await {
                Ok(position) => {
                    info!("map ready at {position}");
                    MapStatus::Ready(position)
                }
                Err(e) => {
                    warn!("no position fix: {e}");
                    MapStatus::Unavailable
                }
            },
        };
        self.status
    }

    /// Syncs the session with the identity provider.
    ///
    /// A different user starts a fresh session (and cooldown); signing out
    /// drops the session and closes any open form.
    pub fn refresh_identity(&mut self) -> Option<&UserId> {
        let current = self.identity.current_user_id();
        let unchanged = match (&self.session, &current) {
            (Some(session), Some(user)) => session.user_id() == user,
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            if self.form.is_some() {
                self.close_form();
            }
            let now = self.clock.now();
            let cooldown_seconds = self.config.cooldown_seconds;
            self.session = current.map(|user| {
                info!("session started for {user}");
                Session::new(user, now, cooldown_seconds)
            });
            if self.session.is_none() {
                info!("signed out");
            }
        }
        self.session.as_ref().map(Session::user_id)
    }

    /// Handles a press on an empty map location.
    pub async fn press_location(&mut self, at: Coordinate) -> PressOutcome {
        let MapStatus::Ready(user_location) = self.status else {
            debug!("map not ready; ignoring press at {at}");
            return PressOutcome::Ignored;
        };
        if self.form.is_some() {
            self.close_form();
            return PressOutcome::FormClosed;
        }
        self.refresh_identity();

        let now = self.clock.now();
        let Some(session) = self.session.as_ref() else {
            debug!("nobody signed in; ignoring press at {at}");
            return PressOutcome::Ignored;
        };
        let owner_id = session.user_id().clone();

        let acquire = session.cooldown().try_acquire(now);
        if !acquire.allowed {
            let remaining_seconds = acquire.remaining_seconds;
            self.notify(
                NoticeKind::CooldownActive,
                "Cooldown Active",
                format!(
                    "You must wait {remaining_seconds} seconds until you can place another marker."
                ),
            );
            return PressOutcome::Rejected(Rejection::CooldownActive { remaining_seconds });
        }

        let existing = self.store.markers();
        let rejection = match self.policy.evaluate(user_location, at, &existing) {
            Decision::Accepted => None,
            Decision::RejectedOutOfRange { distance_km } => {
                let limit = self.config.max_range_m();
                self.notify(
                    NoticeKind::OutOfRange,
                    "Out of range",
                    format!("You can only place markers within {limit}m of your location."),
                );
                Some(Rejection::OutOfRange { distance_km })
            }
            Decision::RejectedTooCloseToExisting { distance_km } => {
                let limit = self.config.min_separation_m();
                self.notify(
                    NoticeKind::TooCloseToExisting,
                    "Too close",
                    format!("Markers must be at least {limit}m away from existing markers."),
                );
                Some(Rejection::TooCloseToExisting { distance_km })
            }
        };
        if let Some(rejection) = rejection {
            debug!("press at {at} rejected: {rejection:?}");
            return PressOutcome::Rejected(rejection);
        }

        if let Some(session) = self.session.as_mut() {
            session.cooldown_mut().record(now);
        }
        self.flow = FlowState::AwaitingAddress;

        let address = match self.location.reverse_geocode(at).await {
            Ok(Some(place)) => place.format(),
            Ok(None) => ADDRESS_NOT_AVAILABLE.to_string(),
            Err(e) => {
                warn!("reverse geocoding {at} failed: {e}");
                ADDRESS_NOT_AVAILABLE.to_string()
            }
        };

        self.form = Some(MarkerForm {
            editing: None,
            location: at,
            title: String::new(),
            description: String::new(),
            image_url: None,
            address: Some(address),
            owner_id,
            created_at: now.to_rfc3339(),
        });
        self.flow = FlowState::FormOpen;
        PressOutcome::FormOpened
    }

    /// Opens the edit form for an own marker. Returns whether a form opened.
    pub fn press_marker(&mut self, id: &MarkerId) -> bool {
        self.refresh_identity();
        let Some(marker) = self.store.get(id) else {
            return false;
        };
        let owned = self
            .session
            .as_ref()
            .is_some_and(|s| s.owns(&marker.owner_id));
        if !owned {
            return false;
        }

        self.form = Some(MarkerForm {
            editing: Some(marker.id),
            location: marker.location,
            title: marker.title,
            description: marker.description,
            image_url: marker.image_url,
            address: marker.address,
            owner_id: marker.owner_id,
            created_at: marker.created_at,
        });
        self.flow = FlowState::FormOpen;
        true
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), ControllerError> {
        let form = self.form.as_mut().ok_or(ControllerError::NoForm)?;
        form.title = title.into();
        Ok(())
    }

    pub fn set_description(
        &mut self,
        description: impl Into<String>,
    ) -> Result<(), ControllerError> {
        let form = self.form.as_mut().ok_or(ControllerError::NoForm)?;
        form.description = description.into();
        Ok(())
    }

    /// Asks the image picker for a photo. Cancelling keeps the current one.
    pub async fn pick_image(&mut self) -> Result<bool, ControllerError> {
        if self.form.is_none() {
            return Err(ControllerError::NoForm);
        }
        let picked = self.images.pick_image().await;
        let form = self.form.as_mut().ok_or(ControllerError::NoForm)?;
        match picked {
            Some(uri) => {
                form.image_url = Some(uri);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn close_form(&mut self) {
        self.form = None;
        self.flow = FlowState::Idle;
    }

    /// Saves the open form. The form is cleared whether or not the write
    /// succeeds.
    pub async fn submit(&mut self) -> Result<MarkerId, ControllerError> {
        self.ensure_same_user()?;
        let form = self.form.take().ok_or(ControllerError::NoForm)?;
        self.flow = FlowState::Submitting;

        let stamped_at = self.clock.now().to_rfc3339();
        let result = match form.editing {
            Some(id) => {
                let patch = MarkerPatch {
                    title: Some(form.title),
                    description: Some(form.description),
                    created_at: Some(stamped_at),
                    image_url: Some(form.image_url),
                    address: Some(form.address),
                };
                self.store.update(&id, patch).await.map(|()| id)
            }
            None => {
                let input = MarkerInput {
                    location: form.location,
                    title: form.title,
                    description: form.description,
                    owner_id: form.owner_id,
                    created_at: stamped_at,
                    image_url: form.image_url,
                    address: form.address,
                };
                self.store.create(input).await
            }
        };
        self.flow = FlowState::Idle;

        match result {
            Ok(id) => {
                self.notify(NoticeKind::Saved, "Saved", "Your marker has been saved.");
                Ok(id)
            }
            Err(e) => {
                self.notify(NoticeKind::RemoteWriteFailure, "Error", e.to_string());
                Err(ControllerError::Store(e))
            }
        }
    }

    /// Deletes the marker being edited. The form stays open if the delete
    /// fails.
    pub async fn delete_selected(&mut self) -> Result<MarkerId, ControllerError> {
        self.ensure_same_user()?;
        let form = self.form.as_ref().ok_or(ControllerError::NoForm)?;
        let id = form.editing.clone().ok_or(ControllerError::NotEditing)?;

        match self.store.delete(&id).await {
            Ok(()) => {
                self.close_form();
                self.notify(NoticeKind::Deleted, "Deleted", "Your marker has been deleted.");
                Ok(id)
            }
            Err(e) => {
                self.notify(NoticeKind::RemoteWriteFailure, "Error", e.to_string());
                Err(ControllerError::Store(e))
            }
        }
    }

    /// Re-reads the identity before a write. Fails if nobody is signed in or
    /// the user changed, in which case any open form has been closed.
    fn ensure_same_user(&mut self) -> Result<(), ControllerError> {
        let before = self.session.as_ref().map(|s| s.user_id().clone());
        match self.refresh_identity() {
            Some(user) if Some(user) == before.as_ref() => Ok(()),
            _ => Err(ControllerError::NotSignedIn),
        }
    }

    fn notify(&mut self, kind: NoticeKind, title: &str, message: impl Into<String>) {
        self.notices.emit(Notice::new(kind, title, message));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        ADDRESS_NOT_AVAILABLE, Collaborators, ControllerError, FlowState, MapController,
        MapStatus, PressOutcome, Rejection,
    };
    use crate::collaborators::{
        FixedImage, FixedLocation, ImagePicker, NoImages, PlaceAddress, StaticIdentity,
    };
    use crate::config::PlacementConfig;
    use foundation::ids::{MarkerId, UserId};
    use foundation::math::Coordinate;
    use foundation::time::Time;
    use markers::marker::MarkerInput;
    use markers::memory::MemoryCollection;
    use markers::store::MarkerStore;
    use pretty_assertions::assert_eq;
    use runtime::clock::ManualClock;
    use runtime::event_bus::NoticeKind;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    struct Rig {
        controller: MapController,
        db: Arc<MemoryCollection>,
        clock: Arc<ManualClock>,
        identity: Arc<StaticIdentity>,
    }

    fn rig_with(location: FixedLocation, images: Arc<dyn ImagePicker>) -> Rig {
        let db = Arc::new(MemoryCollection::new());
        let clock = Arc::new(ManualClock::new(Time(1_000_000.0)));
        let identity = Arc::new(StaticIdentity::signed_in(UserId::new("u1")));
        let store = MarkerStore::new(db.clone(), "markers");
        let controller = MapController::new(
            PlacementConfig::default(),
            store,
            Collaborators {
                identity: identity.clone(),
                location: Arc::new(location),
                images,
                clock: clock.clone(),
            },
        );
        Rig {
            controller,
            db,
            clock,
            identity,
        }
    }

    fn bridge_street() -> PlaceAddress {
        PlaceAddress {
            street: Some("Bridge St".to_string()),
            city: Some("London".to_string()),
            region: Some("England".to_string()),
            country: Some("United Kingdom".to_string()),
        }
    }

    async fn ready_rig() -> Rig {
        let mut rig = rig_with(
            FixedLocation::new(c(0.0, 0.0)).with_address(bridge_street()),
            Arc::new(NoImages),
        );
        assert_eq!(rig.controller.start().await, MapStatus::Ready(c(0.0, 0.0)));
        rig
    }

    async fn place(rig: &mut Rig, at: Coordinate, title: &str) -> MarkerId {
        assert_eq!(rig.controller.press_location(at).await, PressOutcome::FormOpened);
        rig.controller.set_title(title).unwrap();
        rig.controller.submit().await.unwrap()
    }

    #[tokio::test]
    async fn denied_permission_leaves_map_unavailable() {
        let mut rig = rig_with(FixedLocation::denied(), Arc::new(NoImages));
        assert_eq!(rig.controller.start().await, MapStatus::Unavailable);
        assert_eq!(
            rig.controller.notices().last().map(|n| n.kind),
            Some(NoticeKind::PermissionDenied)
        );
        assert_eq!(rig.controller.drain_notices().len(), 1);
        assert!(rig.controller.notices().is_empty());
        assert_eq!(
            rig.controller.press_location(c(0.0, 0.0)).await,
            PressOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn press_before_start_is_ignored() {
        let mut rig = rig_with(FixedLocation::new(c(0.0, 0.0)), Arc::new(NoImages));
        assert_eq!(rig.controller.status(), MapStatus::Loading);
        assert_eq!(
            rig.controller.press_location(c(0.0, 0.0008)).await,
            PressOutcome::Ignored
        );
        assert_eq!(rig.controller.flow(), FlowState::Idle);
    }

    #[tokio::test]
    async fn accepted_press_opens_prefilled_form_and_submit_creates() {
        let mut rig = ready_rig().await;

        let outcome = rig.controller.press_location(c(0.0, 0.0008)).await;
        assert_eq!(outcome, PressOutcome::FormOpened);
        assert_eq!(rig.controller.flow(), FlowState::FormOpen);
        let form = rig.controller.form().unwrap().clone();
        assert_eq!(form.editing, None);
        assert_eq!(
            form.address.as_deref(),
            Some("Bridge St London, England, United Kingdom")
        );
        assert_eq!(form.owner_id, UserId::new("u1"));
        assert_eq!(form.created_at, Time(1_000_000.0).to_rfc3339());

        rig.controller.set_title("Broken light").unwrap();
        rig.controller.set_description("Pole 14").unwrap();
        let id = rig.controller.submit().await.unwrap();

        assert_eq!(rig.controller.flow(), FlowState::Idle);
        assert!(rig.controller.form().is_none());
        let stored = rig.controller.store().get(&id).unwrap();
        assert_eq!(stored.title, "Broken light");
        assert_eq!(stored.description, "Pole 14");
        assert_eq!(stored.owner_id, UserId::new("u1"));
        assert_eq!(rig.db.documents("markers").len(), 1);
        assert_eq!(
            rig.controller.notices().last().map(|n| n.kind),
            Some(NoticeKind::Saved)
        );
    }

    #[tokio::test]
    async fn second_press_within_cooldown_reports_remaining_seconds() {
        let mut rig = ready_rig().await;
        place(&mut rig, c(0.0, 0.0008), "first").await;

        rig.clock.advance(10.0);
        let outcome = rig.controller.press_location(c(0.0, -0.0008)).await;
        assert_eq!(
            outcome,
            PressOutcome::Rejected(Rejection::CooldownActive {
                remaining_seconds: 50
            })
        );
        assert_eq!(rig.controller.flow(), FlowState::Idle);
        let notice = rig.controller.notices().last().unwrap();
        assert_eq!(notice.title, "Cooldown Active");
        assert_eq!(
            notice.message,
            "You must wait 50 seconds until you can place another marker."
        );

        rig.clock.advance(50.0);
        assert_eq!(
            rig.controller.press_location(c(0.0, -0.0008)).await,
            PressOutcome::FormOpened
        );
    }

    #[tokio::test]
    async fn cooldown_starts_when_the_form_opens() {
        let mut rig = ready_rig().await;
        assert_eq!(
            rig.controller.press_location(c(0.0, 0.0008)).await,
            PressOutcome::FormOpened
        );
        // Dismissing the form does not give the attempt back.
        assert_eq!(
            rig.controller.press_location(c(0.0, 0.0)).await,
            PressOutcome::FormClosed
        );
        assert!(rig.controller.form().is_none());

        rig.clock.advance(1.0);
        assert!(matches!(
            rig.controller.press_location(c(0.0, 0.0008)).await,
            PressOutcome::Rejected(Rejection::CooldownActive { .. })
        ));
        assert!(rig.db.documents("markers").is_empty());
    }

    #[tokio::test]
    async fn too_close_press_is_rejected_without_consuming_cooldown() {
        let mut rig = ready_rig().await;
        place(&mut rig, c(0.0, 0.0008), "first").await;
        rig.clock.advance(61.0);

        let outcome = rig.controller.press_location(c(0.0, 0.00085)).await;
        assert!(
            matches!(
                outcome,
                PressOutcome::Rejected(Rejection::TooCloseToExisting { distance_km })
                    if distance_km < 0.005
            ),
            "{outcome:?}"
        );
        assert_eq!(rig.controller.flow(), FlowState::Idle);
        assert_eq!(
            rig.controller.notices().last().map(|n| n.kind),
            Some(NoticeKind::TooCloseToExisting)
        );

        assert_eq!(
            rig.controller.press_location(c(0.0, -0.0008)).await,
            PressOutcome::FormOpened
        );
    }

    #[tokio::test]
    async fn out_of_range_press_is_rejected() {
        let mut rig = rig_with(FixedLocation::new(c(51.5007, -0.1246)), Arc::new(NoImages));
        rig.controller.start().await;

        let outcome = rig.controller.press_location(c(51.5020, -0.1246)).await;
        assert!(matches!(
            outcome,
            PressOutcome::Rejected(Rejection::OutOfRange { .. })
        ));
        let notice = rig.controller.notices().last().unwrap();
        assert_eq!(notice.title, "Out of range");
        assert_eq!(
            notice.message,
            "You can only place markers within 100m of your location."
        );
        assert_eq!(rig.controller.flow(), FlowState::Idle);
    }

    #[tokio::test]
    async fn geocoder_failure_uses_placeholder_address() {
        let mut rig = rig_with(
            FixedLocation::new(c(0.0, 0.0)).with_failing_geocoder(),
            Arc::new(NoImages),
        );
        rig.controller.start().await;
        rig.controller.press_location(c(0.0, 0.0005)).await;
        assert_eq!(
            rig.controller.form().and_then(|f| f.address.as_deref()),
            Some(ADDRESS_NOT_AVAILABLE)
        );
    }

    #[tokio::test]
    async fn signed_out_press_is_ignored() {
        let mut rig = ready_rig().await;
        rig.identity.sign_out();
        assert_eq!(
            rig.controller.press_location(c(0.0, 0.0008)).await,
            PressOutcome::Ignored
        );
        assert!(rig.controller.session().is_none());
    }

    #[tokio::test]
    async fn own_marker_opens_edit_form_and_submit_updates() {
        let mut rig = ready_rig().await;
        let id = place(&mut rig, c(0.0, 0.0008), "first").await;

        assert!(rig.controller.press_marker(&id));
        assert_eq!(rig.controller.flow(), FlowState::FormOpen);
        let form = rig.controller.form().unwrap();
        assert_eq!(form.editing, Some(id.clone()));
        assert_eq!(form.title, "first");

        rig.clock.advance(5.0);
        rig.controller.set_title("edited").unwrap();
        assert_eq!(rig.controller.submit().await.unwrap(), id);

        let stored = rig.controller.store().get(&id).unwrap();
        assert_eq!(stored.title, "edited");
        assert_eq!(stored.created_at, Time(1_000_005.0).to_rfc3339());
        assert_eq!(rig.db.documents("markers").len(), 1);
    }

    #[tokio::test]
    async fn foreign_marker_press_is_a_no_op() {
        let mut rig = ready_rig().await;
        let id = rig
            .controller
            .store()
            .create(MarkerInput {
                location: c(0.0, 0.0008),
                title: "theirs".to_string(),
                description: String::new(),
                owner_id: UserId::new("u2"),
                created_at: String::new(),
                image_url: None,
                address: None,
            })
            .await
            .unwrap();

        assert!(!rig.controller.press_marker(&id));
        assert!(rig.controller.form().is_none());
        assert_eq!(rig.controller.flow(), FlowState::Idle);
        assert!(matches!(
            rig.controller.delete_selected().await,
            Err(ControllerError::NoForm)
        ));
    }

    #[tokio::test]
    async fn failed_submit_clears_form_and_reports() {
        let mut rig = ready_rig().await;
        rig.controller.press_location(c(0.0, 0.0008)).await;
        rig.db.set_fail_writes(true);

        let err = rig.controller.submit().await.unwrap_err();
        assert!(matches!(err, ControllerError::Store(_)));
        assert!(rig.controller.form().is_none());
        assert_eq!(rig.controller.flow(), FlowState::Idle);
        assert!(rig.controller.store().is_empty());
        assert_eq!(
            rig.controller.notices().last().map(|n| n.kind),
            Some(NoticeKind::RemoteWriteFailure)
        );
    }

    #[tokio::test]
    async fn delete_selected_removes_own_marker() {
        let mut rig = ready_rig().await;
        let id = place(&mut rig, c(0.0, 0.0008), "first").await;

        rig.controller.press_marker(&id);
        rig.db.set_fail_writes(true);
        assert!(rig.controller.delete_selected().await.is_err());
        assert!(rig.controller.form().is_some());

        rig.db.set_fail_writes(false);
        assert_eq!(rig.controller.delete_selected().await.unwrap(), id);
        assert!(rig.controller.form().is_none());
        assert!(rig.controller.store().is_empty());
        assert!(rig.db.documents("markers").is_empty());
    }

    #[tokio::test]
    async fn new_form_has_nothing_to_delete() {
        let mut rig = ready_rig().await;
        rig.controller.press_location(c(0.0, 0.0008)).await;
        assert!(matches!(
            rig.controller.delete_selected().await,
            Err(ControllerError::NotEditing)
        ));
    }

    #[tokio::test]
    async fn user_change_starts_fresh_session() {
        let mut rig = ready_rig().await;
        place(&mut rig, c(0.0, 0.0008), "first").await;
        let changes = rig.controller.identity_changes();

        rig.identity.sign_in(UserId::new("u2"));
        assert!(changes.has_changed().unwrap());
        rig.clock.advance(1.0);
        assert_eq!(rig.controller.refresh_identity(), Some(&UserId::new("u2")));
        assert_eq!(
            rig.controller.press_location(c(0.0, -0.0008)).await,
            PressOutcome::FormOpened
        );

        rig.identity.sign_out();
        assert_eq!(rig.controller.refresh_identity(), None);
        assert!(rig.controller.form().is_none());
        assert!(matches!(
            rig.controller.submit().await,
            Err(ControllerError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn switched_user_cannot_open_previous_users_marker() {
        let mut rig = ready_rig().await;
        let id = place(&mut rig, c(0.0, 0.0008), "first").await;

        rig.identity.sign_in(UserId::new("u2"));
        assert!(!rig.controller.press_marker(&id));
        assert!(rig.controller.form().is_none());
        assert_eq!(
            rig.controller.session().map(|s| s.user_id().clone()),
            Some(UserId::new("u2"))
        );
    }

    #[tokio::test]
    async fn open_edit_form_is_not_saved_after_user_switch() {
        let mut rig = ready_rig().await;
        let id = place(&mut rig, c(0.0, 0.0008), "first").await;

        assert!(rig.controller.press_marker(&id));
        rig.controller.set_title("changed by u2").unwrap();
        rig.identity.sign_in(UserId::new("u2"));

        assert!(matches!(
            rig.controller.submit().await,
            Err(ControllerError::NotSignedIn)
        ));
        assert!(rig.controller.form().is_none());
        assert_eq!(
            rig.controller.store().get(&id).map(|m| m.title),
            Some("first".to_string())
        );
        assert_eq!(rig.db.documents("markers")[0].fields["title"], "first");
    }

    #[tokio::test]
    async fn open_edit_form_is_not_deleted_after_sign_out() {
        let mut rig = ready_rig().await;
        let id = place(&mut rig, c(0.0, 0.0008), "first").await;

        assert!(rig.controller.press_marker(&id));
        rig.identity.sign_out();

        assert!(matches!(
            rig.controller.delete_selected().await,
            Err(ControllerError::NotSignedIn)
        ));
        assert!(rig.controller.store().get(&id).is_some());
        assert_eq!(rig.db.documents("markers").len(), 1);
    }

    #[tokio::test]
    async fn picked_image_is_kept_on_the_form() {
        let mut rig = rig_with(
            FixedLocation::new(c(0.0, 0.0)),
            Arc::new(FixedImage("file:///photo.jpg".to_string())),
        );
        rig.controller.start().await;
        assert!(matches!(
            rig.controller.pick_image().await,
            Err(ControllerError::NoForm)
        ));

        rig.controller.press_location(c(0.0, 0.0005)).await;
        assert!(rig.controller.pick_image().await.unwrap());
        let id = rig.controller.submit().await.unwrap();
        assert_eq!(
            rig.controller.store().get(&id).and_then(|m| m.image_url),
            Some("file:///photo.jpg".to_string())
        );
    }
}
