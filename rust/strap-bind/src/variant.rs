//! Tagged unions: host enums whose variants each wrap one marshalled type.
//!
//! ```ignore
//! enum Key { Int(i64), Text(String) }
//! impl_variant!(Key { Int(i64), Text(String) });
//! ```
//!
//! There is no tag in the dynamic form. Reading tries the alternatives in
//! declaration order and keeps the first that decodes, so a narrower type
//! must be listed before a wider one (`i64` before `f64`). Writing and
//! emplacing go through whichever alternative is active.

/// Implements [`Marshal`](crate::Marshal) for an enum of single-field
/// tuple variants.
///
/// The union is readable, writable or emplaceable only when every
/// alternative is. Omitted trailing arguments have no default.
#[macro_export]
macro_rules! impl_variant {
    ($ty:ident { $($alt:ident($inner:ty)),+ $(,)? }) => {
        impl $crate::Marshal for $ty {
            const CAPS: $crate::Caps = $crate::Caps {
                read: true $(&& <$inner as $crate::Marshal>::CAPS.read)+,
                write: true $(&& <$inner as $crate::Marshal>::CAPS.is_writable())+,
                emplace: true $(&& <$inner as $crate::Marshal>::CAPS.emplace)+,
                default: false,
            };

            fn type_name() -> &'static str {
                stringify!($ty)
            }

            fn read(state: &mut $crate::strap_rt::State, idx: i32) -> Option<Self> {
                $(
                    if let Some(v) = $crate::traits::read::<$inner>(state, idx) {
                        return Some($ty::$alt(v));
                    }
                )+
                None
            }

            fn write(
                &self,
                state: &mut $crate::strap_rt::State,
            ) -> $crate::strap_rt::RuntimeResult<()> {
                match self {
                    $($ty::$alt(v) => $crate::traits::write(state, v),)+
                }
            }

            fn emplace(
                &self,
                state: &mut $crate::strap_rt::State,
                idx: i32,
            ) -> $crate::strap_rt::RuntimeResult<()> {
                match self {
                    $($ty::$alt(v) => $crate::traits::emplace(state, v, idx),)+
                }
            }
        }
    };
}
