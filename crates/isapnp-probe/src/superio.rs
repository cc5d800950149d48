//! UMC Super I/O chips that expose an ISA PnP resource block once their
//! configuration register C1 bit 7 is set.

use tracing::{debug, info};

use crate::dump::{DumpSink, DumpWriter};
use crate::port_io::PortIo;
use crate::report::SuperIoReport;
use crate::scanner::ScanContext;

pub const INDEX_PORT: u16 = 0x0108;
pub const DATA_PORT: u16 = 0x0109;

/// Written to the index port to unlock the configuration registers.
pub const UNLOCK: u8 = 0xAA;
/// Written to the index port to lock them again.
pub const LOCK: u8 = 0x55;

pub const REG_CONFIG: u8 = 0xC1;
pub const REG_ID: u8 = 0xC2;
/// First register read by the register dump; reads wrap around to 0xBF.
pub const REGISTER_DUMP_START: u8 = 0xC0;

/// C1 bit enabling the PnP resource block.
pub const PNP_ENABLE: u8 = 0x80;

/// Name registered for the resource dump.
pub const RESOURCE_DUMP_NAME: &str = "UMCSIOP";
/// Prefix of the register dump file name.
pub const REGISTER_DUMP_PREFIX: &str = "UMCSIOR";

fn read_register<P: PortIo + ?Sized>(io: &mut P, index: u8) -> u8 {
    io.write_byte(INDEX_PORT, UNLOCK);
    io.write_byte(INDEX_PORT, index);
    io.read_byte(DATA_PORT)
}

/// Probe for the chip and dump it. `read_port` must already be programmed.
///
/// Leaves C1 bit 7 set and the chip locked.
pub fn probe<P: PortIo, S: DumpSink>(
    ctx: &mut ScanContext<P, S>,
    read_port: u16,
) -> Option<SuperIoReport> {
    let io = ctx.io_mut();
    io.write_byte(INDEX_PORT, UNLOCK);
    if io.read_byte(INDEX_PORT) == 0xFF {
        debug!("no UMC Super I/O at {INDEX_PORT:04X}");
        return None;
    }

    io.write_byte(INDEX_PORT, REG_ID);
    let c2_unlocked = io.read_byte(DATA_PORT);
    io.write_byte(INDEX_PORT, LOCK);
    io.write_byte(INDEX_PORT, REG_ID);
    let c2_locked = io.read_byte(DATA_PORT);
    info!("UMC Super I/O (C2U={c2_unlocked:02X} C2L={c2_locked:02X})");

    let config = read_register(io, REG_CONFIG);
    io.write_byte(INDEX_PORT, UNLOCK);
    io.write_byte(INDEX_PORT, REG_CONFIG);
    io.write_byte(DATA_PORT, config | PNP_ENABLE);

    let record = ctx.registry_mut().register(None, RESOURCE_DUMP_NAME);
    let resources = ctx.dump_resources(read_port, &record);

    let register_name = format!("{REGISTER_DUMP_PREFIX}{}.BIN", record.suffix());
    info!("Dumping registers to {register_name}");
    let mut registers = [0u8; 256];
    let mut index = REGISTER_DUMP_START;
    loop {
        if let Some(slot) = registers.get_mut(usize::from(index)) {
            *slot = read_register(ctx.io_mut(), index);
        }
        index = index.wrapping_add(1);
        if index == REGISTER_DUMP_START {
            break;
        }
    }
    let mut writer = DumpWriter::create(ctx.sink_mut(), &register_name);
    for byte in registers {
        writer.push(byte);
    }
    let register_file = writer.finish();

    ctx.io_mut().write_byte(INDEX_PORT, LOCK);

    Some(SuperIoReport {
        c2_unlocked,
        c2_locked,
        resources,
        register_file,
    })
}
