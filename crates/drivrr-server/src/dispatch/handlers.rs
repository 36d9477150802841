//! Ride state machine: one handler per inbound message type.
//!
//! Handlers run synchronously on the sender's read loop. Every outcome is
//! resolved here (a reply, a log line, or nothing); no error reaches the
//! session.

use std::sync::Arc;

use chrono::Utc;
use drivrr_core::{ActiveRide, Coordinates, DriverAvailability, RideId, Role, TripStatus};
use metrics::counter;
use tracing::{debug, info, warn};

use super::protocol::{
    self, AcceptOfferPayload, CancelRidePayload, CompleteRidePayload, CounterOfferPayload,
    CounterOfferResponse, DriverAssigned, DriverLocation, DriverOffer, DriverOfferPayload,
    DriverStatusPayload, InboundMessage, LocationUpdatePayload, OfferAccepted, OfferRejected,
    OutboundMessage, Pong, ProtocolError, RideCancelled, RideCompleted, RideRequest,
    RideRequestPayload, TripStatusPayload, TripStatusUpdate,
};
use crate::estimator::EtaEstimator;
use crate::metrics::{
    DISPATCH_MESSAGES_TOTAL, OFFERS_REJECTED_TOTAL, RIDES_ASSIGNED_TOTAL, RIDES_CANCELLED_TOTAL,
    RIDES_COMPLETED_TOTAL, WS_PROTOCOL_FAULTS_TOTAL,
};
use crate::websocket::connection::ClientConnection;
use crate::websocket::registry::{Registry, RideError};

/// Initial driver position is the pickup shifted by this many degrees.
const DRIVER_START_OFFSET: f64 = 0.01;

/// Routes decoded messages to their handlers.
pub struct Dispatcher {
    registry: Arc<Registry>,
    estimator: Arc<dyn EtaEstimator>,
}

impl Dispatcher {
    /// Create a dispatcher over a shared registry.
    pub fn new(registry: Arc<Registry>, estimator: Arc<dyn EtaEstimator>) -> Self {
        Self {
            registry,
            estimator,
        }
    }

    /// The registry handlers mutate.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Decode and handle one text frame from `sender`.
    ///
    /// Returns `false` if the frame was dropped as a protocol fault.
    pub fn dispatch(&self, sender: &ClientConnection, text: &str) -> bool {
        let message = match InboundMessage::decode(text).and_then(|m| {
            m.authorize(sender.role)?;
            Ok(m)
        }) {
            Ok(message) => message,
            Err(error) => {
                protocol_fault(sender, &error);
                return false;
            }
        };

        counter!(DISPATCH_MESSAGES_TOTAL, "type" => message.type_name()).increment(1);
        debug!(user_id = %sender.user_id, message_type = message.type_name(), "dispatching");

        match message {
            InboundMessage::CreateRideRequest(p) => self.create_ride_request(sender, p),
            InboundMessage::DriverOffer(p) => self.driver_offer(sender, p),
            InboundMessage::AcceptOffer(p) => self.accept_offer(sender, p),
            InboundMessage::DriverStatus(p) => self.driver_status(sender, p),
            InboundMessage::DriverLocationUpdate(p) => self.driver_location_update(sender, p),
            InboundMessage::CompleteRide(p) => self.complete_ride(sender, p),
            InboundMessage::Ping => self.ping(sender),
            InboundMessage::CounterOffer(p) => self.counter_offer(sender, p),
            InboundMessage::CancelRide(p) => self.cancel_ride(sender, p),
            InboundMessage::UpdateTripStatus(p) => self.update_trip_status(sender, p),
        }
        true
    }

    /// Broadcast a fresh ride request to every connected driver.
    fn create_ride_request(&self, sender: &ClientConnection, p: RideRequestPayload) {
        let request = RideRequest {
            ride_id: RideId::generate(),
            customer_id: sender.user_id.clone(),
            pickup: p.pickup,
            destination: p.destination,
            pickup_lat: p.pickup_lat,
            pickup_lng: p.pickup_lng,
            dest_lat: p.dest_lat,
            dest_lng: p.dest_lng,
            customer_fare_offer: p.customer_fare_offer,
            vehicle_type: p.vehicle_type,
            distance: p.distance,
            duration: p.duration,
            timestamp: protocol::timestamp(),
        };
        let ride_id = request.ride_id.clone();
        let fare = request.customer_fare_offer;
        let delivered = self
            .registry
            .broadcast_to_drivers(&OutboundMessage::NewRideRequest(request));
        info!(
            %ride_id,
            customer_id = %sender.user_id,
            fare,
            delivered,
            "ride request broadcast"
        );
    }

    /// Forward a driver's price offer to the customer, unless the driver is busy.
    fn driver_offer(&self, sender: &ClientConnection, p: DriverOfferPayload) {
        if self.registry.driver_availability(&sender.user_id) == DriverAvailability::Busy {
            warn!(driver_id = %sender.user_id, ride_id = %p.ride_id, "busy driver attempted an offer");
            counter!(OFFERS_REJECTED_TOTAL, "reason" => "driver_busy").increment(1);
            let _ = self.registry.send_to(
                sender,
                &OutboundMessage::OfferRejected(OfferRejected {
                    ride_id: Some(p.ride_id),
                    reason: "You already have an active ride".into(),
                    message: "Complete your current ride before accepting new ones".into(),
                }),
            );
            return;
        }

        let offer = DriverOffer {
            ride_id: p.ride_id,
            driver_id: sender.user_id.clone(),
            customer_id: p.customer_id,
            offer: p.offer,
            message: p.message,
            timestamp: protocol::timestamp(),
        };
        let ride_id = offer.ride_id.clone();
        let customer_id = offer.customer_id.clone();
        let amount = offer.offer;
        if self
            .registry
            .send_to_customer(&customer_id, &OutboundMessage::DriverOffer(offer))
        {
            info!(%ride_id, driver_id = %sender.user_id, %customer_id, offer = amount, "offer sent");
        } else {
            debug!(%ride_id, %customer_id, "customer not reachable, offer dropped");
        }
    }

    /// Assign the driver, store the ride, and notify both parties.
    fn accept_offer(&self, sender: &ClientConnection, p: AcceptOfferPayload) {
        let pickup = Coordinates::new(p.pickup_lat, p.pickup_lng);
        let eta = self.estimator.estimate_eta_minutes(pickup.lat, pickup.lng);
        let ride = ActiveRide {
            ride_id: p.ride_id.clone(),
            customer_id: sender.user_id.clone(),
            driver_id: p.driver_id.clone(),
            status: TripStatus::Accepted,
            pickup,
            destination: Coordinates::new(p.dest_lat, p.dest_lng),
            final_price: p.final_price,
            accepted_at: Utc::now(),
            driver_location: pickup.offset(DRIVER_START_OFFSET),
            driver_eta_minutes: eta,
        };
        let driver_location = ride.driver_location;

        if let Err(error) = self.registry.assign_ride(ride) {
            let (reason, message, label) = match &error {
                RideError::AlreadyActive(_) => (
                    "Ride already accepted",
                    "This ride has already been assigned to a driver",
                    "ride_active",
                ),
                RideError::DriverUnavailable(_) => (
                    "Driver is no longer available",
                    "Please choose another offer",
                    "driver_unavailable",
                ),
                _ => (
                    "Driver is no longer available",
                    "Please choose another offer",
                    "driver_busy",
                ),
            };
            warn!(ride_id = %p.ride_id, driver_id = %p.driver_id, %error, "acceptance refused");
            counter!(OFFERS_REJECTED_TOTAL, "reason" => label).increment(1);
            let _ = self.registry.send_to(
                sender,
                &OutboundMessage::OfferRejected(OfferRejected {
                    ride_id: Some(p.ride_id),
                    reason: reason.into(),
                    message: message.into(),
                }),
            );
            return;
        }

        counter!(RIDES_ASSIGNED_TOTAL).increment(1);
        info!(
            ride_id = %p.ride_id,
            driver_id = %p.driver_id,
            customer_id = %sender.user_id,
            eta,
            "driver assigned, now busy"
        );

        let accepted = OutboundMessage::OfferAccepted(OfferAccepted {
            ride_id: p.ride_id.clone(),
            customer_id: sender.user_id.clone(),
            final_price: p.final_price,
            status: "accepted",
            pickup_lat: p.pickup_lat,
            pickup_lng: p.pickup_lng,
            dest_lat: p.dest_lat,
            dest_lng: p.dest_lng,
        });
        if !self.registry.send_to_driver(&p.driver_id, &accepted) {
            debug!(driver_id = %p.driver_id, "driver not reachable for offer_accepted");
        }

        let assigned = OutboundMessage::DriverAssigned(DriverAssigned {
            ride_id: p.ride_id,
            driver_name: driver_display_name(&p.driver_id),
            driver_id: p.driver_id,
            driver_lat: driver_location.lat,
            driver_lng: driver_location.lng,
            driver_eta: eta,
            final_price: p.final_price,
            status: "driver_assigned",
            message: format!("Driver will arrive in {eta} minutes"),
        });
        let _ = self.registry.send_to(sender, &assigned);
    }

    fn driver_status(&self, sender: &ClientConnection, p: DriverStatusPayload) {
        let state = self.registry.apply_driver_status(&sender.user_id, p.is_online);
        info!(driver_id = %sender.user_id, online = p.is_online, %state, "driver status changed");
    }

    /// Store the driver's position, refresh the ETA, and tell the customer.
    fn driver_location_update(&self, sender: &ClientConnection, p: LocationUpdatePayload) {
        let Some(ride) = self.registry.active_ride(&p.ride_id) else {
            debug!(ride_id = %p.ride_id, "location update for unknown ride");
            return;
        };
        let eta = self
            .estimator
            .estimate_eta_minutes(ride.pickup.lat, ride.pickup.lng);
        let location = Coordinates::new(p.latitude, p.longitude);

        match self
            .registry
            .update_driver_location(&p.ride_id, &sender.user_id, location, eta)
        {
            Ok(ride) => {
                let update = OutboundMessage::DriverLocationUpdate(DriverLocation {
                    ride_id: ride.ride_id,
                    driver_id: sender.user_id.clone(),
                    latitude: p.latitude,
                    longitude: p.longitude,
                    eta,
                    timestamp: protocol::timestamp(),
                });
                if !self.registry.send_to_customer(&ride.customer_id, &update) {
                    debug!(customer_id = %ride.customer_id, "customer not reachable for location update");
                }
            }
            Err(error) => debug!(ride_id = %p.ride_id, %error, "location update ignored"),
        }
    }

    /// Finish the ride, free the driver, and tell the customer the fare.
    fn complete_ride(&self, sender: &ClientConnection, p: CompleteRidePayload) {
        match self.registry.complete_ride(&p.ride_id, &sender.user_id) {
            Ok(ride) => {
                counter!(RIDES_COMPLETED_TOTAL).increment(1);
                info!(ride_id = %ride.ride_id, driver_id = %sender.user_id, "ride completed, driver available");
                let done = OutboundMessage::RideCompleted(RideCompleted {
                    ride_id: ride.ride_id,
                    driver_id: sender.user_id.clone(),
                    final_price: ride.final_price,
                    status: "completed",
                    timestamp: protocol::timestamp(),
                });
                if !self.registry.send_to_customer(&ride.customer_id, &done) {
                    debug!(customer_id = %ride.customer_id, "customer not reachable for ride_completed");
                }
            }
            Err(error) => warn!(ride_id = %p.ride_id, %error, "completion ignored"),
        }
    }

    fn ping(&self, sender: &ClientConnection) {
        let _ = self.registry.send_to(
            sender,
            &OutboundMessage::Pong(Pong {
                timestamp: protocol::timestamp(),
            }),
        );
    }

    /// Relay a customer's counter price to the driver.
    fn counter_offer(&self, sender: &ClientConnection, p: CounterOfferPayload) {
        let response = OutboundMessage::CounterOfferResponse(CounterOfferResponse {
            ride_id: p.ride_id.clone(),
            customer_id: sender.user_id.clone(),
            new_price: p.new_price,
            timestamp: protocol::timestamp(),
        });
        if self.registry.send_to_driver(&p.driver_id, &response) {
            info!(ride_id = %p.ride_id, driver_id = %p.driver_id, new_price = p.new_price, "counter offer sent");
        } else {
            debug!(driver_id = %p.driver_id, "driver not reachable, counter offer dropped");
        }
    }

    /// Drop the ride on behalf of either party and tell the other one.
    fn cancel_ride(&self, sender: &ClientConnection, p: CancelRidePayload) {
        let ride = match self.registry.cancel_ride(&p.ride_id, &sender.user_id) {
            Ok(ride) => ride,
            Err(error) => {
                warn!(ride_id = %p.ride_id, user_id = %sender.user_id, %error, "cancellation ignored");
                return;
            }
        };
        counter!(RIDES_CANCELLED_TOTAL, "by" => sender.role.as_str()).increment(1);
        info!(ride_id = %ride.ride_id, user_id = %sender.user_id, role = %sender.role, "ride cancelled");

        let notice = OutboundMessage::RideCancelled(RideCancelled {
            ride_id: ride.ride_id.clone(),
            cancelled_by: sender.user_id.clone(),
            reason: p
                .reason
                .unwrap_or_else(|| format!("Cancelled by {}", sender.role)),
            timestamp: protocol::timestamp(),
        });
        let delivered = match ride.counterpart(&sender.user_id) {
            Some(other) if sender.role == Role::Driver => {
                self.registry.send_to_customer(other, &notice)
            }
            Some(other) => self.registry.send_to_driver(other, &notice),
            None => false,
        };
        if !delivered {
            debug!(ride_id = %ride.ride_id, "counterpart not reachable for ride_cancelled");
        }
    }

    /// Record trip progress and fan it out to both participants.
    fn update_trip_status(&self, sender: &ClientConnection, p: TripStatusPayload) {
        match self
            .registry
            .update_trip_status(&p.ride_id, &sender.user_id, p.status)
        {
            Ok(ride) => {
                info!(ride_id = %ride.ride_id, status = ?ride.status, "trip status updated");
                let update = OutboundMessage::TripStatusUpdate(TripStatusUpdate {
                    ride_id: ride.ride_id.clone(),
                    status: ride.status,
                    progress: ride.status.progress(),
                    timestamp: protocol::timestamp(),
                });
                let _ = self.registry.send_to_customer(&ride.customer_id, &update);
                let _ = self.registry.send_to(sender, &update);
            }
            Err(error) => warn!(ride_id = %p.ride_id, %error, "trip status update ignored"),
        }
    }
}

/// Display name shown to the customer: "Driver " plus the first 8 characters.
fn driver_display_name(driver_id: &str) -> String {
    let short: String = driver_id.chars().take(8).collect();
    format!("Driver {short}")
}

fn protocol_fault(sender: &ClientConnection, error: &ProtocolError) {
    counter!(WS_PROTOCOL_FAULTS_TOTAL, "kind" => error.kind()).increment(1);
    warn!(
        conn_id = %sender.id,
        user_id = %sender.user_id,
        role = %sender.role,
        %error,
        "dropping inbound message"
    );
}
