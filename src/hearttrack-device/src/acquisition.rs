use hearttrack_types::RawReading;

/// The sensor and its signal-processing primitive, seen from the controller.
pub trait Acquisition {
    /// Hardware present and responding. Checked once at boot.
    fn probe(&mut self) -> bool;

    /// The subject is engaged with the sensor (finger present).
    fn presence(&mut self) -> bool;

    fn start(&mut self);

    /// Non-blocking: `None` when no new reading is ready yet.
    fn measure(&mut self) -> Option<RawReading>;

    fn stop(&mut self);
}
