//! Protocol constants for Switch 2 controller communication

/// Size of every command/reply frame on the wire
pub const FRAME_SIZE: usize = 64;

/// Size of the command header preceding the payload
pub const HEADER_SIZE: usize = 8;

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD: usize = FRAME_SIZE - HEADER_SIZE;

/// Command ids (NS2_CMD_*)
pub mod cmd {
    pub const NFC: u8 = 0x01;
    pub const FLASH: u8 = 0x02;
    pub const INIT: u8 = 0x03;
    pub const GRIP: u8 = 0x08;
    pub const LED: u8 = 0x09;
    pub const VIBRATE: u8 = 0x0A;
    pub const BATTERY: u8 = 0x0B;
    pub const FEATSEL: u8 = 0x0C;
    pub const FW_UPD: u8 = 0x0D;
    pub const FW_INFO: u8 = 0x10;
    pub const BT_PAIR: u8 = 0x15;

    /// Get command name for debugging
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            NFC => "NFC",
            FLASH => "FLASH",
            INIT => "INIT",
            GRIP => "GRIP",
            LED => "LED",
            VIBRATE => "VIBRATE",
            BATTERY => "BATTERY",
            FEATSEL => "FEATSEL",
            FW_UPD => "FW_UPD",
            FW_INFO => "FW_INFO",
            BT_PAIR => "BT_PAIR",
            _ => "UNKNOWN",
        }
    }
}

/// Direction byte and acknowledgement flags (header byte 1)
pub mod direction {
    /// Controller to host
    pub const IN: u8 = 0x00;
    /// Host to controller
    pub const OUT: u8 = 0x90;
    /// Request accepted
    pub const FLAG_OK: u8 = 0x01;
    /// Request rejected
    pub const FLAG_NACK: u8 = 0x04;
}

/// Transport tag (header byte 2)
pub mod link {
    pub const USB: u8 = 0x00;
    pub const BT: u8 = 0x01;
}

/// Subcommand ids, grouped by command
pub mod subcmd {
    pub mod flash {
        pub const READ_BLOCK: u8 = 0x01;
        pub const WRITE_BLOCK: u8 = 0x02;
        pub const ERASE_BLOCK: u8 = 0x03;
        pub const READ: u8 = 0x04;
        pub const WRITE: u8 = 0x05;
    }

    pub mod init {
        pub const SELECT_REPORT: u8 = 0x0A;
        pub const USB: u8 = 0x0D;
    }

    /// Feature selection
    pub mod featsel {
        pub const GET_INFO: u8 = 0x01;
        pub const SET_MASK: u8 = 0x02;
        pub const CLEAR_MASK: u8 = 0x03;
        pub const ENABLE: u8 = 0x04;
        pub const DISABLE: u8 = 0x05;
    }

    pub mod grip {
        pub const GET_INFO: u8 = 0x01;
        pub const ENABLE_BUTTONS: u8 = 0x02;
        pub const GET_INFO_EXT: u8 = 0x03;
    }

    pub mod led {
        pub const P1: u8 = 0x01;
        pub const P2: u8 = 0x02;
        pub const P3: u8 = 0x03;
        pub const P4: u8 = 0x04;
        pub const ALL_ON: u8 = 0x05;
        pub const ALL_OFF: u8 = 0x06;
        pub const PATTERN: u8 = 0x07;
        pub const BLINK: u8 = 0x08;
    }

    /// Subcommand 1 on the NFC command switches the haptics path on
    pub mod nfc {
        pub const ENABLE_RUMBLE: u8 = 0x01;
    }

    pub mod fw_info {
        pub const GET: u8 = 0x01;
    }
}

/// Flash addresses and block sizes
pub mod flash {
    pub const ADDR_SERIAL: u32 = 0x13002;
    pub const ADDR_FACTORY_PRIMARY_CALIB: u32 = 0x130A8;
    pub const ADDR_FACTORY_SECONDARY_CALIB: u32 = 0x130E8;
    pub const ADDR_FACTORY_TRIGGER_CALIB: u32 = 0x13140;
    pub const ADDR_USER_PRIMARY_CALIB: u32 = 0x1FC040;
    pub const ADDR_USER_SECONDARY_CALIB: u32 = 0x1FC080;

    pub const SIZE_SERIAL: u8 = 0x10;
    pub const SIZE_FACTORY_AXIS_CALIB: u8 = 9;
    pub const SIZE_FACTORY_TRIGGER_CALIB: u8 = 2;
    pub const SIZE_USER_AXIS_CALIB: u8 = 11;

    /// Little-endian marker opening a valid user calibration block
    pub const USER_CALIB_MAGIC: u16 = 0xA1B2;

    /// Second byte of every flash read request
    pub const READ_TAG: u8 = 0x7E;
}

/// Feature selection bits
pub mod feature {
    pub const BUTTONS: u8 = 0x01;
    pub const ANALOG: u8 = 0x02;
    pub const IMU: u8 = 0x04;
    pub const MOUSE: u8 = 0x10;
    pub const RUMBLE: u8 = 0x20;
    pub const MAGNETO: u8 = 0x80;
}

/// Input report ids
pub mod report_id {
    /// Only sent after INIT/SELECT_REPORT switches the report format
    pub const UNIFIED: u8 = 0x05;
    pub const JOYCON_L: u8 = 0x07;
    pub const JOYCON_R: u8 = 0x08;
    pub const PRO: u8 = 0x09;
    pub const GAMECUBE: u8 = 0x0A;
}

/// Fixed command payloads
pub mod payload {
    use super::feature;

    /// INIT/USB; the trailing six bytes carry the console MAC over Bluetooth
    pub const USB_INIT: [u8; 8] = [0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

    pub const GRIP_ENABLE: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

    pub const RUMBLE_ENABLE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

    pub const FEATURE_MASK: [u8; 4] = [
        feature::BUTTONS | feature::ANALOG | feature::IMU | feature::RUMBLE,
        0x00,
        0x00,
        0x00,
    ];

    pub const ENABLED_FEATURES: u32 =
        (feature::BUTTONS | feature::ANALOG | feature::RUMBLE) as u32;

    /// Player LED patterns, indexed by `player_id % 8`
    pub const PLAYER_PATTERNS: [u8; 8] = [0x1, 0x3, 0x7, 0xF, 0x9, 0x5, 0xD, 0x6];
}

/// Normalized axis ranges advertised to the input sink
pub mod axis {
    pub const MIN: i32 = -32768;
    pub const MAX: i32 = 32767;
    pub const FUZZ: i32 = 32;
    pub const FLAT: i32 = 128;

    pub const TRIGGER_RANGE: i32 = 4095;
    /// Raw trigger reading at full pull
    pub const TRIGGER_FULL: i32 = 232;

    /// Center of an uncalibrated 12-bit stick sample
    pub const RAW_CENTER: i32 = 2048;
}

/// Rumble packet constants
pub mod rumble {
    /// Ceiling applied to HD amplitudes, out of 1023
    pub const MAX_AMPLITUDE: u32 = 450;
    pub const HI_FREQ: u16 = 0x187;
    pub const LO_FREQ: u16 = 0x112;

    pub const INTERVAL_MS: u64 = 4;

    pub const REPORT_HD: u8 = 0x01;
    pub const REPORT_PRO: u8 = 0x02;
    pub const REPORT_GAMECUBE: u8 = 0x03;

    /// Upper nibble of every packet header byte; the lower nibble is the sequence
    pub const SEQ_TAG: u8 = 0x50;

    /// Offset of the right-side sub-packet on the Pro Controller
    pub const PRO_SECOND_OFFSET: usize = 0x11;

    pub const GC_OFF: u8 = 0;
    pub const GC_ON: u8 = 1;
    pub const GC_STOP: u8 = 2;
}
