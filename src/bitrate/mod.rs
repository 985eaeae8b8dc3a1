mod table;
mod tcp;
mod udp;

pub use table::{BitrateTable, BitrateTriplet, ResolutionClass};
pub use tcp::{read_tcp_info, NetworkStatus, TcpBitrateController, TcpDecision, TcpInfoSample};
pub use udp::{UdpBitrateController, UdpDecision};

/// Wraps whichever path-specific controller is active for the session's
/// current transport, and owns the resolution-derived triplet table so a
/// transport switch (section 4.G) can re-seed the new controller without the
/// caller re-deriving bounds.
pub struct BitrateController {
    table: BitrateTable,
    class: ResolutionClass,
    active: ActivePath,
}

enum ActivePath {
    Udp(UdpBitrateController),
    Tcp(TcpBitrateController),
}

impl BitrateController {
    pub fn new_udp(table: BitrateTable, class: ResolutionClass) -> Self {
        let triplet = table.triplet(class);
        Self { table, class, active: ActivePath::Udp(UdpBitrateController::new(triplet)) }
    }

    pub fn new_tcp(table: BitrateTable, class: ResolutionClass) -> Self {
        let triplet = table.triplet(class);
        Self { table, class, active: ActivePath::Tcp(TcpBitrateController::new(triplet)) }
    }

    pub fn current_bitrate(&self) -> u32 {
        match &self.active {
            ActivePath::Udp(c) => c.current_bitrate(),
            ActivePath::Tcp(c) => c.current_bitrate(),
        }
    }

    /// Re-seeds the controller for the other transport, per section 4.G's
    /// "set encoder bitrate to the path's initial bitrate" step.
    pub fn switch_to_tcp(&mut self) -> u32 {
        let triplet = self.table.triplet(self.class);
        self.active = ActivePath::Tcp(TcpBitrateController::new(triplet));
        triplet.initial
    }

    pub fn switch_to_udp(&mut self) -> u32 {
        let triplet = self.table.triplet(self.class);
        self.active = ActivePath::Udp(UdpBitrateController::new(triplet));
        triplet.initial
    }

    pub fn as_udp_mut(&mut self) -> Option<&mut UdpBitrateController> {
        match &mut self.active {
            ActivePath::Udp(c) => Some(c),
            ActivePath::Tcp(_) => None,
        }
    }

    pub fn as_tcp_mut(&mut self) -> Option<&mut TcpBitrateController> {
        match &mut self.active {
            ActivePath::Tcp(c) => Some(c),
            ActivePath::Udp(_) => None,
        }
    }
}

#[cfg(test)]
mod bitrate_controller {
    use super::{BitrateController, BitrateTable, ResolutionClass};

    #[test]
    fn switching_path_reseeds_to_initial_bitrate() {
        let table = BitrateTable::default();
        let triplet = table.triplet(ResolutionClass::AtLeast720p);
        let mut controller = BitrateController::new_udp(table, ResolutionClass::AtLeast720p);

        let seeded = controller.switch_to_tcp();

        assert_eq!(seeded, triplet.initial);
        assert_eq!(controller.current_bitrate(), triplet.initial);
        assert!(controller.as_tcp_mut().is_some());
        assert!(controller.as_udp_mut().is_none());
    }
}
