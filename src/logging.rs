//! Macros de log internes.
//!
//! Sans la feature `logging`, les macros ne génèrent aucun code : la
//! bibliothèque reste sans dépendance à `tracing`.
//! - `plan_info!` : chargement d'un snapshot, annulation.
//! - `plan_debug!` : décisions par créneau, rejets de candidats.
//! - `plan_warn!` : créneau en sous-effectif.

#[cfg(feature = "logging")]
macro_rules! plan_info {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! plan_info {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "logging")]
macro_rules! plan_debug {
    ($($arg:tt)*) => { ::tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! plan_debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "logging")]
macro_rules! plan_warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! plan_warn {
    ($($arg:tt)*) => {{}};
}
