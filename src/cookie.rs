//! Subscription cookies.
//!
//! A [`Cookie`] is the opaque identifier an [`crate::event::Event`] hands
//! back when a handler subscribes. It doubles as the key into that event's
//! `SlotMap` of handlers, so looking a handler up or removing it by cookie
//! is O(1) and safe even if the handler was already removed out from under
//! a stale cookie.

use slotmap::new_key_type;

new_key_type! {
    /// An opaque subscription identifier, unique within one event's handler
    /// map. Cookies from different events are not comparable.
    pub struct Cookie;
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn cookies_are_unique_within_a_map() {
        let mut map: SlotMap<Cookie, u32> = SlotMap::with_key();
        let a = map.insert(1);
        let b = map.insert(2);
        assert_ne!(a, b);
        assert_eq!(map[a], 1);
        assert_eq!(map[b], 2);
    }

    #[test]
    fn removed_cookie_is_no_longer_valid() {
        let mut map: SlotMap<Cookie, u32> = SlotMap::with_key();
        let a = map.insert(1);
        map.remove(a);
        assert!(map.get(a).is_none());
    }
}
