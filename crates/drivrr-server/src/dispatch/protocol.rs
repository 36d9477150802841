//! Wire protocol: JSON frames in, `{type, data}` envelopes out.
//!
//! Inbound decoding is two-step: the frame must be a JSON object with a
//! string `type`, and the whole object is then decoded into the payload
//! struct for that type. Any failure is a [`ProtocolError`]; nothing here
//! panics on client input.
//!
//! Payload fields mirror the camelCase wire names one-to-one.

use std::sync::Arc;

use drivrr_core::{Role, RideId, TripStatus, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not parseable as JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// Valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// `type` absent or not a string.
    #[error("missing or non-string `type` field")]
    MissingType,
    /// `type` not recognized.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    /// Recognized type with missing or mistyped fields.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        /// Message type being decoded.
        kind: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// Sent by a role that may not send this type.
    #[error("`{kind}` may not be sent by a {role}")]
    WrongRole {
        /// Message type.
        kind: &'static str,
        /// Sender's role.
        role: Role,
    },
}

impl ProtocolError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::WrongRole { .. } => "wrong_role",
        }
    }
}

// ── Inbound payloads ────────────────────────────────────────────────

/// `create_ride_request`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestPayload {
    /// Pickup address.
    pub pickup: String,
    /// Destination address.
    pub destination: String,
    /// Pickup latitude.
    pub pickup_lat: f64,
    /// Pickup longitude.
    pub pickup_lng: f64,
    /// Destination latitude.
    pub dest_lat: f64,
    /// Destination longitude.
    pub dest_lng: f64,
    /// Fare the customer proposes.
    pub customer_fare_offer: f64,
    /// Requested vehicle class.
    pub vehicle_type: String,
    /// Trip distance estimate.
    pub distance: f64,
    /// Trip duration estimate.
    pub duration: f64,
}

/// `driver_offer`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOfferPayload {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Customer the ride belongs to.
    pub customer_id: UserId,
    /// Price the driver proposes.
    pub offer: f64,
    /// Free-form note shown to the other party.
    #[serde(default)]
    pub message: Option<String>,
}

/// `accept_offer`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOfferPayload {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Driver identifier.
    pub driver_id: UserId,
    /// Agreed fare.
    pub final_price: f64,
    /// Pickup latitude.
    pub pickup_lat: f64,
    /// Pickup longitude.
    pub pickup_lng: f64,
    /// Destination latitude.
    pub dest_lat: f64,
    /// Destination longitude.
    pub dest_lng: f64,
}

/// `driver_status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatusPayload {
    /// `true` to go online, `false` to go offline.
    pub is_online: bool,
}

/// `driver_location_update`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdatePayload {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Driver latitude.
    pub latitude: f64,
    /// Driver longitude.
    pub longitude: f64,
}

/// `complete_ride`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRidePayload {
    /// Ride identifier.
    pub ride_id: RideId,
}

/// `counter_offer`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOfferPayload {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Driver identifier.
    pub driver_id: UserId,
    /// Customer's counter price.
    pub new_price: f64,
}

/// `cancel_ride`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRidePayload {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Human-readable reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// `update_trip_status`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStatusPayload {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Ride status label.
    pub status: TripStatus,
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Customer asks for a ride.
    CreateRideRequest(RideRequestPayload),
    /// Driver proposes a price.
    DriverOffer(DriverOfferPayload),
    /// Customer accepts a driver's offer.
    AcceptOffer(AcceptOfferPayload),
    /// Driver toggles online/offline.
    DriverStatus(DriverStatusPayload),
    /// Driver reports its position.
    DriverLocationUpdate(LocationUpdatePayload),
    /// Driver finishes the ride.
    CompleteRide(CompleteRidePayload),
    /// Application-level liveness check.
    Ping,
    /// Customer counters a driver's price.
    CounterOffer(CounterOfferPayload),
    /// Either party cancels.
    CancelRide(CancelRidePayload),
    /// Driver reports trip progress.
    UpdateTripStatus(TripStatusPayload),
}

impl InboundMessage {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let kind = match map.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(ProtocolError::MissingType),
        };
        let body = Value::Object(map);

        let message = match kind.as_str() {
            "create_ride_request" => {
                Self::CreateRideRequest(payload("create_ride_request", body)?)
            }
            "driver_offer" => Self::DriverOffer(payload("driver_offer", body)?),
            "accept_offer" => Self::AcceptOffer(payload("accept_offer", body)?),
            "driver_status" => Self::DriverStatus(payload("driver_status", body)?),
            "driver_location_update" => {
                Self::DriverLocationUpdate(payload("driver_location_update", body)?)
            }
            "complete_ride" => Self::CompleteRide(payload("complete_ride", body)?),
            "ping" => Self::Ping,
            "counter_offer" => Self::CounterOffer(payload("counter_offer", body)?),
            "cancel_ride" => Self::CancelRide(payload("cancel_ride", body)?),
            "update_trip_status" => Self::UpdateTripStatus(payload("update_trip_status", body)?),
            _ => return Err(ProtocolError::UnknownType(kind)),
        };
        Ok(message)
    }

    /// Wire name of the message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateRideRequest(_) => "create_ride_request",
            Self::DriverOffer(_) => "driver_offer",
            Self::AcceptOffer(_) => "accept_offer",
            Self::DriverStatus(_) => "driver_status",
            Self::DriverLocationUpdate(_) => "driver_location_update",
            Self::CompleteRide(_) => "complete_ride",
            Self::Ping => "ping",
            Self::CounterOffer(_) => "counter_offer",
            Self::CancelRide(_) => "cancel_ride",
            Self::UpdateTripStatus(_) => "update_trip_status",
        }
    }

    /// Role allowed to send this type; `None` means either.
    pub fn sender_role(&self) -> Option<Role> {
        match self {
            Self::CreateRideRequest(_) | Self::AcceptOffer(_) | Self::CounterOffer(_) => {
                Some(Role::Customer)
            }
            Self::DriverOffer(_)
            | Self::DriverStatus(_)
            | Self::DriverLocationUpdate(_)
            | Self::CompleteRide(_)
            | Self::UpdateTripStatus(_) => Some(Role::Driver),
            Self::Ping | Self::CancelRide(_) => None,
        }
    }

    /// Check the sender's role against [`sender_role`](Self::sender_role).
    pub fn authorize(&self, role: Role) -> Result<(), ProtocolError> {
        match self.sender_role() {
            Some(required) if required != role => Err(ProtocolError::WrongRole {
                kind: self.type_name(),
                role,
            }),
            _ => Ok(()),
        }
    }
}

fn payload<T: DeserializeOwned>(kind: &'static str, body: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(body).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

// ── Outbound payloads ───────────────────────────────────────────────

/// `new_ride_request`, broadcast to drivers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Customer the ride belongs to.
    pub customer_id: UserId,
    /// Pickup address.
    pub pickup: String,
    /// Destination address.
    pub destination: String,
    /// Pickup latitude.
    pub pickup_lat: f64,
    /// Pickup longitude.
    pub pickup_lng: f64,
    /// Destination latitude.
    pub dest_lat: f64,
    /// Destination longitude.
    pub dest_lng: f64,
    /// Fare the customer proposes.
    pub customer_fare_offer: f64,
    /// Requested vehicle class.
    pub vehicle_type: String,
    /// Trip distance estimate.
    pub distance: f64,
    /// Trip duration estimate.
    pub duration: f64,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// `offer_rejected`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRejected {
    /// Ride identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<RideId>,
    /// Human-readable reason.
    pub reason: String,
    /// Free-form note shown to the other party.
    pub message: String,
}

/// `driver_offer`, driver to customer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOffer {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Driver identifier.
    pub driver_id: UserId,
    /// Customer the ride belongs to.
    pub customer_id: UserId,
    /// Price the driver proposes.
    pub offer: f64,
    /// Free-form note shown to the other party.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// `offer_accepted`, to the chosen driver.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferAccepted {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Customer the ride belongs to.
    pub customer_id: UserId,
    /// Agreed fare.
    pub final_price: f64,
    /// Ride status label.
    pub status: &'static str,
    /// Pickup latitude.
    pub pickup_lat: f64,
    /// Pickup longitude.
    pub pickup_lng: f64,
    /// Destination latitude.
    pub dest_lat: f64,
    /// Destination longitude.
    pub dest_lng: f64,
}

/// `driver_assigned`, to the accepting customer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAssigned {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Driver identifier.
    pub driver_id: UserId,
    /// Display name for the driver.
    pub driver_name: String,
    /// Driver starting latitude.
    pub driver_lat: f64,
    /// Driver starting longitude.
    pub driver_lng: f64,
    /// Minutes until the driver reaches pickup.
    #[serde(rename = "driverETA")]
    pub driver_eta: u32,
    /// Agreed fare.
    pub final_price: f64,
    /// Ride status label.
    pub status: &'static str,
    /// Free-form note shown to the other party.
    pub message: String,
}

/// `driver_location_update`, to the ride's customer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Driver identifier.
    pub driver_id: UserId,
    /// Driver latitude.
    pub latitude: f64,
    /// Driver longitude.
    pub longitude: f64,
    /// Refreshed minutes until arrival.
    pub eta: u32,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// `ride_completed`, to the ride's customer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCompleted {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Driver identifier.
    pub driver_id: UserId,
    /// Agreed fare.
    pub final_price: f64,
    /// Ride status label.
    pub status: &'static str,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// `pong`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Pong {
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// `counter_offer_response`, customer to driver.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOfferResponse {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Customer the ride belongs to.
    pub customer_id: UserId,
    /// Customer's counter price.
    pub new_price: f64,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// `ride_cancelled`, to the other participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCancelled {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Participant who cancelled.
    pub cancelled_by: UserId,
    /// Human-readable reason.
    pub reason: String,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// `trip_status_update`, to both participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStatusUpdate {
    /// Ride identifier.
    pub ride_id: RideId,
    /// Ride status label.
    pub status: TripStatus,
    /// Completion percentage for the status.
    pub progress: u8,
    /// RFC 3339 send time.
    pub timestamp: String,
}

/// A server-to-client message, serialized as `{"type": .., "data": {..}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Ride request fanned out to drivers.
    NewRideRequest(RideRequest),
    /// Offer or acceptance refused.
    OfferRejected(OfferRejected),
    /// Driver proposes a price.
    DriverOffer(DriverOffer),
    /// Driver was chosen.
    OfferAccepted(OfferAccepted),
    /// Customer learns the assigned driver.
    DriverAssigned(DriverAssigned),
    /// Driver reports its position.
    DriverLocationUpdate(DriverLocation),
    /// Ride finished.
    RideCompleted(RideCompleted),
    /// Reply to `ping`.
    Pong(Pong),
    /// Counter price relayed to the driver.
    CounterOfferResponse(CounterOfferResponse),
    /// Other party cancelled.
    RideCancelled(RideCancelled),
    /// Trip progress for both parties.
    TripStatusUpdate(TripStatusUpdate),
}

impl OutboundMessage {
    /// Wire name of the message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NewRideRequest(_) => "new_ride_request",
            Self::OfferRejected(_) => "offer_rejected",
            Self::DriverOffer(_) => "driver_offer",
            Self::OfferAccepted(_) => "offer_accepted",
            Self::DriverAssigned(_) => "driver_assigned",
            Self::DriverLocationUpdate(_) => "driver_location_update",
            Self::RideCompleted(_) => "ride_completed",
            Self::Pong(_) => "pong",
            Self::CounterOfferResponse(_) => "counter_offer_response",
            Self::RideCancelled(_) => "ride_cancelled",
            Self::TripStatusUpdate(_) => "trip_status_update",
        }
    }

    /// Serialize once for delivery to one or many queues.
    pub fn to_json(&self) -> Option<Arc<String>> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Arc::new(json)),
            Err(error) => {
                warn!(message_type = self.type_name(), %error, "failed to serialize outbound message");
                None
            }
        }
    }
}

/// Current time as RFC 3339 UTC.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
