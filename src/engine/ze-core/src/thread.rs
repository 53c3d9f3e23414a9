use fnv::FnvHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::ThreadId;

static THREAD_NAME_MAP: Lazy<RwLock<FnvHashMap<ThreadId, Arc<String>>>> =
    Lazy::new(RwLock::default);

/// Associate a display name with a thread, shown by the logger sinks
pub fn set_thread_name(id: ThreadId, name: impl Into<String>) {
    THREAD_NAME_MAP.write().insert(id, Arc::new(name.into()));
}

/// Name of the current thread as registered, falling back to the std thread name
pub fn current_thread_name() -> Option<Arc<String>> {
    let current = std::thread::current();
    thread_name(current.id()).or_else(|| current.name().map(|name| Arc::new(name.to_string())))
}

pub fn thread_name(id: ThreadId) -> Option<Arc<String>> {
    THREAD_NAME_MAP.read().get(&id).cloned()
}

pub fn clear_thread_name(id: ThreadId) {
    THREAD_NAME_MAP.write().remove(&id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_name_wins() {
        let handle = std::thread::Builder::new()
            .name("std name".to_string())
            .spawn(|| {
                assert_eq!(current_thread_name().unwrap().as_str(), "std name");
                set_thread_name(std::thread::current().id(), "Shader Compiler");
                assert_eq!(current_thread_name().unwrap().as_str(), "Shader Compiler");
                clear_thread_name(std::thread::current().id());
                assert_eq!(current_thread_name().unwrap().as_str(), "std name");
            })
            .unwrap();
        handle.join().unwrap();
    }
}
