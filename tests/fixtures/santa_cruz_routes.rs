//! Santa Cruz de la Sierra routes for headless simulation tests.

use bus_motion::route::Route;
use bus_motion::traits::{Waypoint, WaypointKind};

/// Depot, one house, school. About 140 m end to end.
pub fn three_stop_route() -> Route {
    Route::new(vec![
        Waypoint::new(WaypointKind::Depot, "Garaje", -17.7833, -63.1821).with_id(1),
        Waypoint::new(WaypointKind::House, "Casa Rojas", -17.7834, -63.1820).with_id(2),
        Waypoint::new(WaypointKind::School, "Colegio", -17.7840, -63.1810).with_id(3),
    ])
}

/// A longer morning run with four houses spread well apart.
pub fn morning_route() -> Route {
    Route::new(vec![
        Waypoint::new(WaypointKind::Depot, "Garaje", -17.7833, -63.1821),
        Waypoint::new(WaypointKind::House, "Casa 1", -17.7850, -63.1800),
        Waypoint::new(WaypointKind::House, "Casa 2", -17.7870, -63.1790),
        Waypoint::new(WaypointKind::House, "Casa 3", -17.7885, -63.1770),
        Waypoint::new(WaypointKind::House, "Casa 4", -17.7900, -63.1755),
        Waypoint::new(WaypointKind::School, "Colegio", -17.7920, -63.1740),
    ])
}
