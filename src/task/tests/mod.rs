use std::sync::Arc;

use parking_lot::Mutex;


/// Shared event log and a handler appending to it.
pub(crate) fn recorder<T>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static)
where
    T: Clone + Send + 'static,
{
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |value: &T| sink.lock().push(value.clone()))
}
