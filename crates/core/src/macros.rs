// SPDX-License-Identifier: MIT

//! Small declarative macros shared across the workspace: a `Display` helper
//! for plain string-mapped enums, and a pair of builder generators used by
//! the data model types in this crate and by test fixtures elsewhere.

/// Implements `Display` for an enum whose variants each map to a fixed
/// string literal.
///
/// ```ignore
/// simple_display!(Status {
///     Pending => "pending",
///     Running => "running",
/// });
/// ```
#[macro_export]
macro_rules! simple_display {
    ($ty:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let s = match self {
                    $(Self::$variant => $str),+
                };
                f.write_str(s)
            }
        }
    };
}

/// Generates a `FooBuilder` test fixture for `Foo`, with three kinds of
/// fields:
///
/// - `into(name: Type = default)` — setter takes `impl Into<Type>`
/// - `set(name: Type = default)` — setter takes `Type` directly
/// - `option(name: Type)` — setter takes `Type`, field wraps in `Option`,
///   defaults to `None`
///
/// Only compiled under `#[cfg(any(test, feature = "test-support"))]` — it is
/// a convenience for constructing fixtures, not part of the production API.
#[macro_export]
macro_rules! builder {
    (
        $builder:ident for $target:ident {
            $( into($ifield:ident : $itype:ty = $idefault:expr) ),* $(,)?
            $( set($sfield:ident : $stype:ty = $sdefault:expr) ),* $(,)?
            $( option($ofield:ident : $otype:ty) ),* $(,)?
        }
        build($self:ident) -> $target2:ident $body:block
    ) => {
        #[cfg(any(test, feature = "test-support"))]
        pub struct $builder {
            $( $ifield: $itype, )*
            $( $sfield: $stype, )*
            $( $ofield: Option<$otype>, )*
        }

        #[cfg(any(test, feature = "test-support"))]
        impl Default for $builder {
            fn default() -> Self {
                Self {
                    $( $ifield: $idefault, )*
                    $( $sfield: $sdefault, )*
                    $( $ofield: None, )*
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $builder {
            $(
                pub fn $ifield(mut self, value: impl Into<$itype>) -> Self {
                    self.$ifield = value.into();
                    self
                }
            )*
            $(
                pub fn $sfield(mut self, value: $stype) -> Self {
                    self.$sfield = value;
                    self
                }
            )*
            $(
                pub fn $ofield(mut self, value: $otype) -> Self {
                    self.$ofield = Some(value);
                    self
                }
            )*

            pub fn build($self) -> $target2 $body
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $target {
            pub fn test_builder() -> $builder {
                $builder::default()
            }
        }
    };
}

/// Generates production setter methods (no builder struct, no `Default`) for
/// the given field groups, in the same `into`/`set`/`option` vocabulary as
/// [`builder!`].
#[macro_export]
macro_rules! setters {
    (
        $target:ident {
            $( into($ifield:ident : $itype:ty) ),* $(,)?
            $( set($sfield:ident : $stype:ty) ),* $(,)?
            $( option($ofield:ident : $otype:ty) ),* $(,)?
        }
    ) => {
        impl $target {
            $(
                pub fn $ifield(mut self, value: impl Into<$itype>) -> Self {
                    self.$ifield = value.into();
                    self
                }
            )*
            $(
                pub fn $sfield(mut self, value: $stype) -> Self {
                    self.$sfield = value;
                    self
                }
            )*
            $(
                pub fn $ofield(mut self, value: $otype) -> Self {
                    self.$ofield = Some(value);
                    self
                }
            )*
        }
    };
}
