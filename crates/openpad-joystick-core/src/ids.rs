//! Button and axis index tables.
//!
//! Drivers emit positional indexes; layout names live here so every decoder
//! agrees on which slot is which.

pub mod buttons {
    pub const SOUTH: u8 = 0;
    pub const EAST: u8 = 1;
    pub const WEST: u8 = 2;
    pub const NORTH: u8 = 3;
    pub const BACK: u8 = 4;
    pub const GUIDE: u8 = 5;
    pub const START: u8 = 6;
    pub const LEFT_STICK: u8 = 7;
    pub const RIGHT_STICK: u8 = 8;
    pub const LEFT_SHOULDER: u8 = 9;
    pub const RIGHT_SHOULDER: u8 = 10;
    pub const DPAD_UP: u8 = 11;
    pub const DPAD_DOWN: u8 = 12;
    pub const DPAD_LEFT: u8 = 13;
    pub const DPAD_RIGHT: u8 = 14;
    pub const MISC1: u8 = 15;
    pub const RIGHT_PADDLE1: u8 = 16;
    pub const LEFT_PADDLE1: u8 = 17;
    pub const RIGHT_PADDLE2: u8 = 18;
    pub const LEFT_PADDLE2: u8 = 19;
    pub const TOUCHPAD: u8 = 20;
    pub const MISC2: u8 = 21;
    pub const MISC3: u8 = 22;
    pub const MISC4: u8 = 23;
    pub const MISC5: u8 = 24;
    pub const MISC6: u8 = 25;
    pub const COUNT: u8 = 26;
}

pub mod axes {
    pub const LEFTX: u8 = 0;
    pub const LEFTY: u8 = 1;
    pub const RIGHTX: u8 = 2;
    pub const RIGHTY: u8 = 3;
    pub const LEFT_TRIGGER: u8 = 4;
    pub const RIGHT_TRIGGER: u8 = 5;
    pub const COUNT: u8 = 6;
}
