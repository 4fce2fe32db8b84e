#![allow(dead_code)]

use mavlink::common::MavCmd;
use powerfly_core::{
    Coordinate, MissionConfig, MissionEvent, MissionMachine, MissionPhase, PowerPort, PowerSignal,
    VehiclePort,
};
use std::time::{Duration, SystemTime};

/// Vehicle that reaches every commanded target by the next readout.
pub struct SimVehicle {
    pub armed: bool,
    pub guided: bool,
    pub position: Coordinate,
    pub commands: Vec<MavCmd>,
    pub gotos: Vec<Coordinate>,
    pub landings: usize,
}

impl SimVehicle {
    pub fn on_ground(at: Coordinate) -> Self {
        Self {
            armed: false,
            guided: true,
            position: at.with_altitude(0.0),
            commands: Vec::new(),
            gotos: Vec::new(),
            landings: 0,
        }
    }
}

impl VehiclePort for SimVehicle {
    fn is_armed(&self) -> bool {
        self.armed
    }
    fn is_guided(&self) -> bool {
        self.guided
    }
    fn position(&self) -> Coordinate {
        self.position
    }
    fn relative_altitude_m(&self) -> f64 {
        self.position.altitude_m
    }
    fn ground_speed_mps(&self) -> f64 {
        0.0
    }

    fn set_armed(&mut self, armed: bool) {
        self.armed = armed;
    }

    fn command_long(&mut self, command: MavCmd, params: [f32; 7]) {
        if command == MavCmd::MAV_CMD_NAV_TAKEOFF {
            self.position.altitude_m = f64::from(params[6]);
        }
        self.commands.push(command);
    }

    fn goto_location(&mut self, target: Coordinate) {
        self.position = target;
        self.gotos.push(target);
    }

    fn land(&mut self) {
        self.position.altitude_m = 0.0;
        self.armed = false;
        self.landings += 1;
    }
}

/// Records every signal except INFO.
#[derive(Default)]
pub struct Recorder {
    pub signals: Vec<PowerSignal>,
    pub info_lines: usize,
}

impl PowerPort for Recorder {
    fn send(&mut self, signal: PowerSignal, _payload: &[u8]) {
        match signal {
            PowerSignal::Info => self.info_lines += 1,
            other => self.signals.push(other),
        }
    }
}

pub struct Flight {
    pub machine: MissionMachine,
    pub vehicle: SimVehicle,
    pub power: Recorder,
    clock: SystemTime,
}

impl Flight {
    pub fn new(config: MissionConfig, start: Coordinate) -> Self {
        Self {
            machine: MissionMachine::new(config),
            vehicle: SimVehicle::on_ground(start),
            power: Recorder::default(),
            clock: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        }
    }

    pub fn arm(&mut self) {
        self.vehicle.set_armed(true);
        self.machine
            .handle_event(MissionEvent::ArmedChanged(true), &mut self.vehicle, &mut self.power);
    }

    pub fn tick(&mut self) {
        self.clock += self.machine.config().tick_period();
        self.machine.tick(&mut self.vehicle, &mut self.power, self.clock);
    }

    /// Arms and ticks until the mission phase begins.
    pub fn take_off(&mut self) {
        self.arm();
        for _ in 0..1_000 {
            if self.machine.phase() == MissionPhase::Mission {
                return;
            }
            self.tick();
        }
        panic!("takeoff did not finish");
    }

    /// Ticks until the machine is idle again, returning the number of ticks.
    pub fn run_to_idle(&mut self, limit: usize) -> usize {
        for ticks in 0..limit {
            if self.machine.phase() == MissionPhase::Idle {
                return ticks;
            }
            self.tick();
        }
        panic!("machine still in {:?} after {limit} ticks", self.machine.phase());
    }
}
