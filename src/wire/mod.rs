// Wire layer: OSC framing and the VMC address space.
// Pure functions of bytes; no state lives here.

pub mod osc;
pub mod vmc;
