//! Simulated SPD EEPROMs, controller register files and DRAM for the unit tests.
extern crate std;

use core::cell::RefCell;
use embedded_hal::{
    delay::DelayNs,
    i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation},
};
use ppc44x_sdram::{SDRAM0_CFGADDR, SDRAM0_CFGDATA, ddr1, ddr2};
use std::{boxed::Box, collections::HashMap, rc::Rc, vec::Vec};

use crate::{board::ControllerKind, memtest::MemoryBus, spd::SPD_LEN};

/// Unbuffered single rank 256 MiB DDR1 module, CL 2.0/2.5, 7.5 ns at CL 2.5.
pub fn ddr1_spd() -> [u8; SPD_LEN] {
    let mut spd = [0; SPD_LEN];
    spd[..10].copy_from_slice(&[0x80, 0x08, 0x07, 0x0D, 0x0A, 0x01, 0x40, 0x00, 0x04, 0x60]);
    spd[11] = 0x00;
    spd[12] = 0x82;
    spd[15] = 0x01;
    spd[17] = 0x04;
    spd[18] = 0x0C;
    spd[20] = 0x02;
    spd[21] = 0x20;
    spd[23] = 0x75;
    spd[25] = 0x00;
    spd[27] = 0x48;
    spd[28] = 0x30;
    spd[29] = 0x48;
    spd[30] = 0x2A;
    spd[31] = 0x40;
    spd[41] = 0x3C;
    spd[42] = 0x48;
    spd
}

/// Unbuffered single rank 512 MiB DDR2-667 module with eight internal banks, CL 3/4/5.
pub fn ddr2_spd() -> [u8; SPD_LEN] {
    let mut spd = [0; SPD_LEN];
    spd[..10].copy_from_slice(&[0x80, 0x08, 0x08, 0x0E, 0x0A, 0x60, 0x40, 0x00, 0x05, 0x30]);
    spd[11] = 0x00;
    spd[12] = 0x82;
    spd[15] = 0x00;
    spd[17] = 0x08;
    spd[18] = 0x38;
    spd[20] = 0x02;
    spd[21] = 0x00;
    spd[23] = 0x3D;
    spd[25] = 0x50;
    spd[27] = 0x3C;
    spd[28] = 0x1E;
    spd[29] = 0x3C;
    spd[30] = 0x2D;
    spd[31] = 0x80;
    spd[36] = 0x3C;
    spd[37] = 0x1E;
    spd[38] = 0x1E;
    spd[41] = 0x3C;
    spd[42] = 0x69;
    spd
}

/// I2C bus with SPD EEPROMs. Unknown addresses are not acknowledged.
#[derive(Default)]
pub struct SimSpd {
    devices: Vec<(u8, [u8; SPD_LEN])>,
    faulty: Vec<u8>,
    pointer: u8,
}

impl SimSpd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, addr: u8, spd: [u8; SPD_LEN]) -> Self {
        self.devices.push((addr, spd));
        self
    }

    /// Every transfer to `addr` fails with a bus error.
    pub fn with_bus_fault(mut self, addr: u8) -> Self {
        self.faulty.push(addr);
        self
    }
}

impl ErrorType for SimSpd {
    type Error = ErrorKind;
}

impl I2c for SimSpd {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.faulty.contains(&address) {
            return Err(ErrorKind::Bus);
        }
        let spd = self
            .devices
            .iter()
            .find(|(addr, _)| *addr == address)
            .map(|(_, spd)| *spd)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;
        for op in operations {
            match op {
                Operation::Write(buf) => {
                    if let Some(&offset) = buf.first() {
                        self.pointer = offset;
                    }
                }
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = spd[self.pointer as usize % SPD_LEN];
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

struct RegFile {
    kind: ControllerKind,
    cfgaddr: u16,
    sdram: HashMap<u16, u32>,
    dcr: HashMap<u16, u32>,
    writes: Vec<(u16, u32)>,
    hang_init: bool,
    busy: bool,
}

impl RegFile {
    fn stored(&self, offset: u16) -> u32 {
        self.sdram.get(&offset).copied().unwrap_or(0)
    }

    /// Status registers reflect the controller enable bits.
    fn read(&self, offset: u16) -> u32 {
        let value = self.stored(offset);
        match (self.kind, offset) {
            (ControllerKind::Ddr1, ddr1::MCSTS) => {
                let enabled = self.stored(ddr1::CFG0) & (1 << 31) != 0;
                let mut value = value & !(1 << 31);
                if enabled && !self.hang_init {
                    value |= 1 << 31;
                }
                value
            }
            (ControllerKind::Ddr2, ddr2::MCSTAT) => {
                let enabled = self.stored(ddr2::MCOPT2) & (1 << 27) != 0;
                let mut value = value & !((1 << 31) | (1 << 29));
                if enabled && !self.hang_init {
                    value |= 1 << 31;
                }
                if !self.busy {
                    value |= 1 << 29;
                }
                value
            }
            _ => value,
        }
    }
}

/// Shared register file of a simulated SDRAM controller.
#[derive(Clone)]
pub struct FakeSdram(Rc<RefCell<RegFile>>);

impl FakeSdram {
    pub fn new() -> Self {
        Self::ddr2()
    }

    fn with_kind(kind: ControllerKind) -> Self {
        Self(Rc::new(RefCell::new(RegFile {
            kind,
            cfgaddr: 0,
            sdram: HashMap::new(),
            dcr: HashMap::new(),
            writes: Vec::new(),
            hang_init: false,
            busy: false,
        })))
    }

    /// SDRAM0 register file with a delay line of 64 taps.
    pub fn ddr1() -> Self {
        let fake = Self::with_kind(ControllerKind::Ddr1);
        fake.set_sdram(ddr1::DLYCAL, 0x40);
        fake
    }

    /// DDR2 controller register file with a delay line of 256 taps.
    pub fn ddr2() -> Self {
        let fake = Self::with_kind(ControllerKind::Ddr2);
        fake.set_sdram(ddr2::DLCR, 0x40);
        fake
    }

    pub fn sdram(&self, offset: u16) -> u32 {
        self.0.borrow().read(offset)
    }

    /// Preset a register without recording a write.
    pub fn set_sdram(&self, offset: u16, value: u32) {
        self.0.borrow_mut().sdram.insert(offset, value);
    }

    pub fn dcr(&self, dcr: u16) -> u32 {
        self.0.borrow().dcr.get(&dcr).copied().unwrap_or(0)
    }

    /// All indirect register writes in order.
    pub fn sdram_writes(&self) -> Vec<(u16, u32)> {
        self.0.borrow().writes.clone()
    }

    /// Never report a completed initialization.
    pub fn set_hang_init(&self, hang: bool) {
        self.0.borrow_mut().hang_init = hang;
    }

    pub fn set_busy(&self, busy: bool) {
        self.0.borrow_mut().busy = busy;
    }
}

impl crate::regs::SdramAccess for FakeSdram {
    fn read_dcr(&mut self, dcr: u16) -> u32 {
        let regs = self.0.borrow();
        match dcr {
            SDRAM0_CFGADDR => regs.cfgaddr as u32,
            SDRAM0_CFGDATA => regs.read(regs.cfgaddr),
            _ => regs.dcr.get(&dcr).copied().unwrap_or(0),
        }
    }

    fn write_dcr(&mut self, dcr: u16, value: u32) {
        let mut regs = self.0.borrow_mut();
        match dcr {
            SDRAM0_CFGADDR => regs.cfgaddr = value as u16,
            SDRAM0_CFGDATA => {
                let offset = regs.cfgaddr;
                regs.sdram.insert(offset, value);
                regs.writes.push((offset, value));
            }
            _ => {
                regs.dcr.insert(dcr, value);
            }
        }
    }
}

/// Only the first bytes of every 64 KiB block are backed.
const BACKED_BYTES: u64 = 0x100;

/// DRAM which returns inverted data whenever `ok` rejects the current controller settings.
pub struct FakeDram {
    regs: FakeSdram,
    ok: Box<dyn Fn(&FakeSdram) -> bool>,
    words: HashMap<u64, u32>,
    reads: usize,
    writes: usize,
}

impl FakeDram {
    pub fn new(regs: FakeSdram, ok: impl Fn(&FakeSdram) -> bool + 'static) -> Self {
        Self {
            regs,
            ok: Box::new(ok),
            words: HashMap::new(),
            reads: 0,
            writes: 0,
        }
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    /// 64 KiB aligned blocks which were written.
    pub fn touched_banks(&self) -> Vec<u64> {
        let mut banks: Vec<u64> = self.words.keys().map(|addr| addr & !0xFFFF).collect();
        banks.sort_unstable();
        banks.dedup();
        banks
    }
}

impl MemoryBus for FakeDram {
    fn write_word(&mut self, addr: u64, value: u32) {
        self.writes += 1;
        if addr & 0xFFFF < BACKED_BYTES {
            self.words.insert(addr, value);
        }
    }

    fn read_word(&mut self, addr: u64) -> u32 {
        self.reads += 1;
        let value = self.words.get(&addr).copied().unwrap_or(0);
        if (self.ok)(&self.regs) { value } else { !value }
    }

    fn flush(&mut self, _addr: u64) {}
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
