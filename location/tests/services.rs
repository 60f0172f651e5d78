//! Integration tests for the combined location and heading facade.

#![allow(clippy::expect_used)]

use geoplex_location::mocks::{MockHeadingProvider, MockPositionProvider};
use geoplex_location::{
    AccuracyLevel, ConfigError, HeadingServiceState, LocationConfig, LocationServices,
    ServiceState,
};
use geoplex_testing::{init_tracing, test_clock, FixedClock};
use std::time::Duration;

type TestServices = LocationServices<MockPositionProvider, MockHeadingProvider, FixedClock>;

fn services(position: &MockPositionProvider, heading: &MockHeadingProvider) -> TestServices {
    init_tracing();
    LocationServices::with_clock(
        position.clone(),
        heading.clone(),
        test_clock(),
        LocationConfig::default(),
    )
    .expect("default config is valid")
}

#[tokio::test]
async fn test_ids_are_shared_across_managers() {
    let position = MockPositionProvider::new();
    let heading = MockHeadingProvider::new();
    let services = services(&position, &heading);

    let location = services
        .request_location(AccuracyLevel::City, Duration::ZERO, false)
        .await
        .expect("request accepted");
    let compass = services
        .subscribe_to_heading_updates()
        .await
        .expect("subscribed");
    let updates = services
        .subscribe_to_location_updates(None)
        .await
        .expect("subscribed");

    assert!(location.id() < compass.id());
    assert!(compass.id() < updates.id());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = LocationConfig::new().with_heading_filter(-3.0);
    let result = LocationServices::new(
        MockPositionProvider::new(),
        MockHeadingProvider::new(),
        config,
    );
    assert!(matches!(
        result,
        Err(ConfigError::Invalid {
            field: "heading_filter_degrees",
            ..
        })
    ));

    let config = LocationConfig::new().with_subscription_accuracy(AccuracyLevel::None);
    let result = LocationServices::new(
        MockPositionProvider::new(),
        MockHeadingProvider::new(),
        config,
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_service_states_pass_through() {
    let position = MockPositionProvider::with_permission(ServiceState::Disabled);
    let heading = MockHeadingProvider::with_availability(false);
    let services = services(&position, &heading);

    assert_eq!(services.location_services_state(), ServiceState::Disabled);
    assert_eq!(
        services.heading_services_state(),
        HeadingServiceState::Unavailable
    );

    position.set_permission(ServiceState::Available);
    heading.set_available(true);
    assert_eq!(services.location_services_state(), ServiceState::Available);
    assert_eq!(services.heading_services_state(), HeadingServiceState::Available);
}

#[tokio::test]
async fn test_cancel_routes_to_location_manager() {
    let position = MockPositionProvider::new();
    let heading = MockHeadingProvider::new();
    let services = services(&position, &heading);

    let pending = services
        .request_location(AccuracyLevel::Block, Duration::from_secs(30), false)
        .await
        .expect("request accepted");
    services
        .cancel_location_request(pending.id())
        .await
        .expect("cancel");

    assert!(pending.outcome().await.is_none());
    assert_eq!(services.location().pending_request_count().await, 0);
    assert!(!position.is_updating());
}

#[tokio::test]
async fn test_shutdown_stops_both_providers() {
    let position = MockPositionProvider::new();
    let heading = MockHeadingProvider::new();
    let services = services(&position, &heading);

    let mut updates = services
        .subscribe_to_location_updates(Some(AccuracyLevel::House))
        .await
        .expect("subscribed");
    let mut compass = services
        .subscribe_to_heading_updates()
        .await
        .expect("subscribed");
    assert!(position.is_updating());
    assert!(heading.is_running());

    services.shutdown().await.expect("shutdown");

    assert!(updates.next().await.is_none());
    assert!(compass.next().await.is_none());
    assert!(!position.is_updating());
    assert!(!heading.is_running());
    assert!(services.subscribe_to_heading_updates().await.is_err());
}
