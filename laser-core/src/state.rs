use parking_lot::Mutex;
use std::sync::Arc;

/// État partagé entre la pompe du stream, le dispatcher et la couche présentation.
/// Toute mutation passe par ce verrou unique, jamais tenu à travers un `.await`.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
