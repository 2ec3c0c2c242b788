//! Foreign-owned objects embedded in the runtime.

use std::any::{Any, TypeId};
use std::cell::RefCell;

use crate::table::TableRef;

/// An opaque host object living inside the runtime.
///
/// The payload is dropped when the last runtime reference goes away, which
/// makes `Drop` the destructor hook for anything stored here. The metatable
/// can be swapped after creation; marker objects rely on that to change
/// their classification without changing identity.
pub struct Userdata {
    payload: Box<dyn Any>,
    metatable: RefCell<Option<TableRef>>,
}

impl Userdata {
    pub fn new<T: Any>(payload: T) -> Self {
        Self {
            payload: Box::new(payload),
            metatable: RefCell::new(None),
        }
    }

    pub fn with_metatable<T: Any>(payload: T, metatable: Option<TableRef>) -> Self {
        Self {
            payload: Box::new(payload),
            metatable: RefCell::new(metatable),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub fn payload_type_id(&self) -> TypeId {
        Any::type_id(&*self.payload)
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.borrow().clone()
    }

    /// Replaces the metatable, returning the old one.
    pub fn set_metatable(&self, metatable: Option<TableRef>) -> Option<TableRef> {
        self.metatable.replace(metatable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use std::rc::Rc;

    #[test]
    fn payload_downcasts_to_its_own_type_only() {
        let ud = Userdata::new(42u32);
        assert_eq!(ud.downcast_ref::<u32>(), Some(&42));
        assert!(ud.downcast_ref::<i32>().is_none());
        assert_eq!(ud.payload_type_id(), TypeId::of::<u32>());
    }

    #[test]
    fn metatable_can_be_swapped() {
        let ud = Userdata::new(());
        let a = Table::new_ref();
        let b = Table::new_ref();
        ud.set_metatable(Some(a.clone()));
        let old = ud.set_metatable(Some(b.clone()));
        assert!(Rc::ptr_eq(&old.unwrap(), &a));
        assert!(Rc::ptr_eq(&ud.metatable().unwrap(), &b));
    }

    #[test]
    fn payload_drop_runs_when_userdata_is_released() {
        struct Flag(Rc<RefCell<bool>>);
        impl Drop for Flag {
            fn drop(&mut self) {
                *self.0.borrow_mut() = true;
            }
        }
        let dropped = Rc::new(RefCell::new(false));
        let ud = Rc::new(Userdata::new(Flag(dropped.clone())));
        drop(ud);
        assert!(*dropped.borrow());
    }
}
