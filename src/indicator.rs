//! Status indication for the bridge (fault and programming LEDs).

use embedded_hal::digital::v2::OutputPin;

/// Consumer of the bridge status, updated after every command
pub trait Indicator {
    /// Sync error state (also pulsed to signal a rejected mode change)
    fn set_fault(&mut self, on: bool);

    /// Programming mode state
    fn set_active(&mut self, on: bool);
}

/// No indication
impl Indicator for () {
    fn set_fault(&mut self, _on: bool) {}

    fn set_active(&mut self, _on: bool) {}
}

/// LEDs driven from output pins, either of which may be absent
pub struct Leds<F, A> {
    fault: Option<F>,
    active: Option<A>,
}

impl<F, A> Leds<F, A>
where
    F: OutputPin,
    A: OutputPin,
    F::Error: core::fmt::Debug,
    A::Error: core::fmt::Debug,
{
    pub fn new(fault: Option<F>, active: Option<A>) -> Self {
        Self { fault, active }
    }
}

fn drive<P: OutputPin>(pin: &mut Option<P>, on: bool)
where
    P::Error: core::fmt::Debug,
{
    let p = match pin {
        Some(p) => p,
        None => return,
    };

    let r = if on { p.set_high() } else { p.set_low() };
    if let Err(e) = r {
        warn!("Failed to drive indicator: {:?}", e);
    }
}

impl<F, A> Indicator for Leds<F, A>
where
    F: OutputPin,
    A: OutputPin,
    F::Error: core::fmt::Debug,
    A::Error: core::fmt::Debug,
{
    fn set_fault(&mut self, on: bool) {
        drive(&mut self.fault, on)
    }

    fn set_active(&mut self, on: bool) {
        drive(&mut self.active, on)
    }
}
