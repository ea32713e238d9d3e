// Layer 1: domain values and the pixel math underneath the heuristic classifier.
pub mod color;
pub mod pixel;
pub mod frame;

// Layer 2: per-frame decisions. Pure, no I/O.
pub mod debounce;
pub mod color_state_machine;
pub mod idle_watchdog;
pub mod classifier;

// Layer 3: ordered, non-blocking delivery to the outside world.
pub mod notification;
pub mod transport;
