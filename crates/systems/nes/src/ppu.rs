//! NES PPU (2C02 / 2C07 / Dendy) stepped one dot at a time.
//!
//! ## Timing Model
//!
//! - 341 dots per line. NTSC has 262 lines and drops one dot of the
//!   pre-render line on odd frames while rendering; PAL has 312 lines; Dendy
//!   has 312 lines with vblank starting at line 291.
//! - VBlank is raised at (vblank line, dot 1), where the finished picture is
//!   published. Status bits 5-7 are cleared at (pre-render, dot 1).
//! - Pixel `x` of a visible line is output at dot `x + 1` from the mask,
//!   palette and shifter contents of that dot, so a register write lands on
//!   the very next pixel. Sprite 0 hit is raised by the pixel that causes it.
//! - Background tiles are fetched over eight dots each (dots 1-256 and the
//!   two-tile prefetch at 321-336) into 16-bit shifters. Sprites for the
//!   next line are evaluated and fetched at dot 257. Every pattern fetch is
//!   reported to the board so A12-clocked counters see the usual low/high
//!   pattern once per line.
//! - Scroll follows the loopy registers: coarse X every eight dots,
//!   increment Y at dot 256, copy X at 257, copy Y over dots 280-304 of the
//!   pre-render line. `$2007` accesses while rendering bump coarse X and Y
//!   and `$2004` writes only advance OAMADDR by four.
//!
//! ## Memory Map
//!
//! - **$0000-$1FFF**: CHR ROM/RAM (pattern tables, owned by the board)
//! - **$2000-$2FFF**: Nametables (CIRAM via the board's mirroring)
//! - **$3F00-$3FFF**: Palette RAM (32 bytes, mirrored)

use crate::cartridge::Mirroring;
use crate::mappers::Board;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::ppu::CompiledPalette;
use emu_core::state::{Serializer, StateError, SyncState};
use emu_core::timing::TimingMode;
use emu_core::types::Frame;

pub const WIDTH: usize = 256;
pub const HEIGHT: usize = 240;
pub const DOTS_PER_LINE: u16 = 341;

const SPRITE_SLOTS: usize = 8;

/// Sprite fetched for the line being drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SpriteSlot {
    x: u8,
    attr: u8,
    /// Pattern bytes, already flipped vertically
    lo: u8,
    hi: u8,
}

/// Maps a palette address onto the 32 bytes of palette RAM.
fn palette_index(addr: u16) -> usize {
    let mut i = (addr & 0x1F) as usize;
    // $3F10/$3F14/$3F18/$3F1C mirror the background entries.
    if i & 0x13 == 0x10 {
        i &= !0x10;
    }
    i
}

fn nametable_index(addr: u16, mirroring: Mirroring) -> usize {
    let page = mirroring.nametable_page((addr >> 10) & 3);
    page * 0x400 + (addr & 0x03FF) as usize
}

pub struct Ppu {
    region: TimingMode,

    ctrl: u8,
    mask: u8,
    status: u8,
    oam_addr: u8,
    /// Current VRAM address (loopy v)
    v: u16,
    /// Temporary VRAM address (loopy t)
    t: u16,
    fine_x: u8,
    /// Shared $2005/$2006 write toggle
    w: bool,
    read_buffer: u8,
    /// Decaying I/O latch returned by write-only registers
    io_db: u8,

    ciram: Vec<u8>,
    palette: [u8; 32],
    oam: Vec<u8>,

    scanline: u16,
    dot: u16,
    odd_frame: bool,

    /// Background pattern and attribute shifters; bit 15 is the next pixel
    shift_lo: u16,
    shift_hi: u16,
    attr_lo: u16,
    attr_hi: u16,
    next_tile: u8,
    next_attr: u8,
    next_lo: u8,
    next_hi: u8,

    sprites: [SpriteSlot; SPRITE_SLOTS],
    sprite_count: u8,
    /// Slot 0 holds OAM sprite 0
    sprite0_in_line: bool,

    nmi_edge: bool,
    frame_ready: bool,

    /// 6-bit color plus emphasis bits per pixel
    pixels: Vec<u16>,
    colors: CompiledPalette,
    frame: Frame,
}

impl std::fmt::Debug for Ppu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ppu")
            .field("scanline", &self.scanline)
            .field("dot", &self.dot)
            .field("ctrl", &self.ctrl)
            .field("mask", &self.mask)
            .field("status", &self.status)
            .finish()
    }
}

impl Ppu {
    pub fn new(region: TimingMode, colors: CompiledPalette) -> Self {
        Self {
            region,
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            v: 0,
            t: 0,
            fine_x: 0,
            w: false,
            read_buffer: 0,
            io_db: 0,
            // Four pages so four-screen boards need no extra storage.
            ciram: vec![0; 0x1000],
            palette: [0; 32],
            oam: vec![0; 256],
            scanline: 0,
            dot: 0,
            odd_frame: false,
            shift_lo: 0,
            shift_hi: 0,
            attr_lo: 0,
            attr_hi: 0,
            next_tile: 0,
            next_attr: 0,
            next_lo: 0,
            next_hi: 0,
            sprites: [SpriteSlot::default(); SPRITE_SLOTS],
            sprite_count: 0,
            sprite0_in_line: false,
            nmi_edge: false,
            frame_ready: false,
            pixels: vec![0; WIDTH * HEIGHT],
            colors,
            frame: Frame::new(WIDTH as u32, HEIGHT as u32),
        }
    }

    /// Reset line: clears the control registers and the write toggle.
    pub fn reset(&mut self) {
        self.ctrl = 0;
        self.mask = 0;
        self.w = false;
        self.read_buffer = 0;
        self.odd_frame = false;
    }

    pub fn lines_per_frame(&self) -> u16 {
        match self.region {
            TimingMode::Ntsc => 262,
            TimingMode::Pal | TimingMode::Dendy => 312,
        }
    }

    pub fn vblank_line(&self) -> u16 {
        match self.region {
            TimingMode::Dendy => 291,
            TimingMode::Ntsc | TimingMode::Pal => 241,
        }
    }

    fn pre_render_line(&self) -> u16 {
        self.lines_per_frame() - 1
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    fn rendering_enabled(&self) -> bool {
        self.mask & 0x18 != 0
    }

    fn increment(&self) -> u16 {
        if self.ctrl & 0x04 != 0 {
            32
        } else {
            1
        }
    }

    /// Latched NMI edge, consumed by the scheduler.
    pub fn take_nmi_edge(&mut self) -> bool {
        std::mem::take(&mut self.nmi_edge)
    }

    /// Whether a frame was published since the last call.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn set_palette(&mut self, colors: CompiledPalette) {
        self.colors = colors;
        self.publish_frame();
    }

    fn publish_frame(&mut self) {
        self.colors.convert(&self.pixels, &mut self.frame.pixels);
    }

    /// Rebuild derived output after the registers were restored.
    pub fn post_load(&mut self) {
        self.publish_frame();
    }

    pub fn ciram(&self) -> &[u8] {
        &self.ciram
    }

    pub fn ciram_mut(&mut self) -> &mut [u8] {
        &mut self.ciram
    }

    pub fn palette_ram(&self) -> &[u8] {
        &self.palette
    }

    pub fn palette_ram_mut(&mut self) -> &mut [u8] {
        &mut self.palette
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn oam_mut(&mut self) -> &mut [u8] {
        &mut self.oam
    }

    // Register interface

    pub fn read_register(&mut self, addr: u16, board: &mut dyn Board) -> u8 {
        let value = match addr & 7 {
            2 => {
                let value = (self.status & 0xE0) | (self.io_db & 0x1F);
                self.status &= 0x7F;
                self.w = false;
                value
            }
            4 => self.oam_data(),
            7 => {
                let addr = self.v & 0x3FFF;
                let value = if addr >= 0x3F00 {
                    // Palette reads bypass the buffer, which is refilled
                    // from the nametable underneath.
                    let underneath = addr - 0x1000;
                    self.read_buffer = self.ciram[nametable_index(underneath, board.mirroring())];
                    (self.palette[palette_index(addr)] & 0x3F) | (self.io_db & 0xC0)
                } else {
                    let buffered = self.read_buffer;
                    self.read_buffer = self.vram_read(addr, board);
                    buffered
                };
                self.step_vram_address();
                value
            }
            _ => self.io_db,
        };
        self.io_db = value;
        value
    }

    /// Register value as the next read would return it, without side effects.
    pub fn peek_register(&self, addr: u16) -> u8 {
        match addr & 7 {
            2 => (self.status & 0xE0) | (self.io_db & 0x1F),
            4 => self.oam_data(),
            7 => {
                let addr = self.v & 0x3FFF;
                if addr >= 0x3F00 {
                    (self.palette[palette_index(addr)] & 0x3F) | (self.io_db & 0xC0)
                } else {
                    self.read_buffer
                }
            }
            _ => self.io_db,
        }
    }

    fn oam_data(&self) -> u8 {
        let value = self.oam[self.oam_addr as usize];
        if self.oam_addr & 3 == 2 {
            // Unimplemented attribute bits read back as zero.
            value & 0xE3
        } else {
            value
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8, board: &mut dyn Board) {
        self.io_db = val;
        match addr & 7 {
            0 => {
                let was_enabled = self.ctrl & 0x80 != 0;
                self.ctrl = val;
                self.t = (self.t & 0xF3FF) | (((val & 0x03) as u16) << 10);
                if !was_enabled && val & 0x80 != 0 && self.status & 0x80 != 0 {
                    log(LogCategory::PPU, LogLevel::Debug, || {
                        "NMI enabled during vblank".to_string()
                    });
                    self.nmi_edge = true;
                }
            }
            1 => {
                self.mask = val;
                log(LogCategory::PPU, LogLevel::Trace, || {
                    format!("PPUMASK write: 0x{:02X}", val)
                });
            }
            2 => {}
            3 => self.oam_addr = val,
            4 => {
                if self.rendering_active() {
                    // Only the glitchy increment of the sprite index happens.
                    self.oam_addr = self.oam_addr.wrapping_add(4);
                } else {
                    self.oam[self.oam_addr as usize] = val;
                    self.oam_addr = self.oam_addr.wrapping_add(1);
                }
            }
            5 => {
                if !self.w {
                    self.t = (self.t & 0xFFE0) | (val >> 3) as u16;
                    self.fine_x = val & 0x07;
                } else {
                    self.t = (self.t & 0x8C1F)
                        | (((val & 0x07) as u16) << 12)
                        | (((val & 0xF8) as u16) << 2);
                }
                self.w = !self.w;
            }
            6 => {
                if !self.w {
                    self.t = (self.t & 0x00FF) | (((val & 0x3F) as u16) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | val as u16;
                    self.v = self.t;
                    board.ppu_address(self.v & 0x3FFF);
                }
                self.w = !self.w;
            }
            _ => {
                let addr = self.v & 0x3FFF;
                self.vram_write(addr, val, board);
                self.step_vram_address();
            }
        }
    }

    /// Store straight into a register or the memory behind `$2004`/`$2007`
    /// without any of the access side effects.
    pub fn poke_register(&mut self, addr: u16, val: u8, board: &mut dyn Board) {
        match addr & 7 {
            0 => self.ctrl = val,
            1 => self.mask = val,
            2 => self.status = val & 0xE0,
            3 => self.oam_addr = val,
            4 => self.oam[self.oam_addr as usize] = val,
            7 => {
                let addr = self.v & 0x3FFF;
                match addr {
                    0x0000..=0x1FFF => board.write_chr(addr, val),
                    0x2000..=0x3EFF => {
                        self.ciram[nametable_index(addr, board.mirroring())] = val
                    }
                    _ => self.palette[palette_index(addr)] = val,
                }
            }
            // Write-twice latches have no single raw value.
            _ => {}
        }
    }

    fn vram_read(&mut self, addr: u16, board: &mut dyn Board) -> u8 {
        match addr {
            0x0000..=0x1FFF => {
                board.ppu_address(addr);
                board.read_chr(addr)
            }
            0x2000..=0x3EFF => self.ciram[nametable_index(addr, board.mirroring())],
            _ => self.palette[palette_index(addr)],
        }
    }

    fn vram_write(&mut self, addr: u16, val: u8, board: &mut dyn Board) {
        match addr {
            0x0000..=0x1FFF => {
                board.ppu_address(addr);
                board.write_chr(addr, val);
            }
            0x2000..=0x3EFF => self.ciram[nametable_index(addr, board.mirroring())] = val,
            _ => self.palette[palette_index(addr)] = val,
        }
    }

    fn fetch_chr(board: &mut dyn Board, addr: u16) -> u8 {
        board.ppu_address(addr);
        board.read_chr(addr)
    }

    // Dot stepping

    /// Run `dots` PPU dots.
    pub fn advance(&mut self, dots: u32, board: &mut dyn Board) {
        for _ in 0..dots {
            self.tick(board);
        }
    }

    fn tick(&mut self, board: &mut dyn Board) {
        let pre_render = self.pre_render_line();
        let visible = self.scanline < HEIGHT as u16;
        let rendering = self.rendering_enabled();

        if visible || self.scanline == pre_render {
            if self.scanline == pre_render && self.dot == 1 {
                self.status &= 0x1F;
            }
            if rendering {
                self.fetch_step(board);
                match self.dot {
                    256 => self.increment_y(),
                    257 => self.copy_x(),
                    280..=304 if self.scanline == pre_render => self.copy_y(),
                    _ => {}
                }
            }
            if visible && (1..=WIDTH as u16).contains(&self.dot) {
                self.output_pixel();
            }
            if self.dot == 257 {
                self.evaluate_sprites(board);
            }
        } else if self.scanline == self.vblank_line() && self.dot == 1 {
            self.status |= 0x80;
            self.frame_ready = true;
            self.publish_frame();
            if self.ctrl & 0x80 != 0 {
                self.nmi_edge = true;
            }
        }

        self.dot += 1;
        if self.region == TimingMode::Ntsc
            && self.scanline == pre_render
            && self.dot == DOTS_PER_LINE - 1
            && self.odd_frame
            && rendering
        {
            // Odd NTSC frames skip the last dot of the pre-render line.
            self.dot = DOTS_PER_LINE;
        }
        if self.dot >= DOTS_PER_LINE {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline >= self.lines_per_frame() {
                self.scanline = 0;
                self.odd_frame = !self.odd_frame;
            }
        }
    }

    /// Rendering is on and the PPU owns the VRAM bus.
    fn rendering_active(&self) -> bool {
        self.rendering_enabled()
            && (self.scanline < HEIGHT as u16 || self.scanline == self.pre_render_line())
    }

    /// Post-access update of `v` for `$2007`. While rendering, the access
    /// collides with the fetch logic and bumps coarse X and Y instead.
    fn step_vram_address(&mut self) {
        if self.rendering_active() {
            self.increment_x();
            self.increment_y();
        } else {
            self.v = self.v.wrapping_add(self.increment()) & 0x7FFF;
        }
    }

    /// One dot of the background pipeline: tiles are fetched over eight dots
    /// and enter the shifters two tiles ahead of the pixel being output.
    fn fetch_step(&mut self, board: &mut dyn Board) {
        let dot = self.dot;
        if !((2..=257).contains(&dot) || (321..=337).contains(&dot)) {
            return;
        }
        self.shift_lo <<= 1;
        self.shift_hi <<= 1;
        self.attr_lo <<= 1;
        self.attr_hi <<= 1;

        let fine_y = (self.v >> 12) & 7;
        let base: u16 = if self.ctrl & 0x10 != 0 { 0x1000 } else { 0x0000 };
        match (dot - 1) % 8 {
            0 => {
                self.load_shifters();
                let addr = 0x2000 | (self.v & 0x0FFF);
                self.next_tile = self.ciram[nametable_index(addr, board.mirroring())];
            }
            2 => {
                let v = self.v;
                let addr = 0x23C0 | (v & 0x0C00) | ((v >> 4) & 0x38) | ((v >> 2) & 0x07);
                let shift = ((v >> 4) & 4) | (v & 2);
                self.next_attr = (self.ciram[nametable_index(addr, board.mirroring())] >> shift) & 3;
            }
            4 => {
                self.next_lo = Self::fetch_chr(board, base + self.next_tile as u16 * 16 + fine_y);
            }
            6 => {
                self.next_hi =
                    Self::fetch_chr(board, base + self.next_tile as u16 * 16 + fine_y + 8);
            }
            7 => self.increment_x(),
            _ => {}
        }
    }

    fn load_shifters(&mut self) {
        self.shift_lo = (self.shift_lo & 0xFF00) | self.next_lo as u16;
        self.shift_hi = (self.shift_hi & 0xFF00) | self.next_hi as u16;
        let attr = self.next_attr;
        let fill = |bit: u8| -> u16 { if attr & bit != 0 { 0x00FF } else { 0 } };
        self.attr_lo = (self.attr_lo & 0xFF00) | fill(1);
        self.attr_hi = (self.attr_hi & 0xFF00) | fill(2);
    }

    fn increment_x(&mut self) {
        if self.v & 0x001F == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if self.v & 0x7000 != 0x7000 {
            self.v += 0x1000;
            return;
        }
        self.v &= !0x7000;
        let mut coarse_y = (self.v & 0x03E0) >> 5;
        if coarse_y == 29 {
            coarse_y = 0;
            self.v ^= 0x0800;
        } else if coarse_y == 31 {
            coarse_y = 0;
        } else {
            coarse_y += 1;
        }
        self.v = (self.v & !0x03E0) | (coarse_y << 5);
    }

    fn copy_x(&mut self) {
        self.v = (self.v & !0x041F) | (self.t & 0x041F);
    }

    fn copy_y(&mut self) {
        self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
    }

    /// Compose the pixel of the current dot from the registers as they are
    /// right now.
    fn output_pixel(&mut self) {
        let x = (self.dot - 1) as usize;
        let y = self.scanline as usize;
        let emphasis = ((self.mask >> 5) as u16) << 6;
        let grey = if self.mask & 0x01 != 0 { 0x30 } else { 0x3F };

        let addr = if self.rendering_enabled() {
            self.pixel_entry(x) as u16
        } else if self.v & 0x3F00 == 0x3F00 {
            // With rendering off, a palette address in `v` shows its color.
            self.v
        } else {
            0
        };
        self.pixels[y * WIDTH + x] = (self.palette[palette_index(addr)] & grey) as u16 | emphasis;
    }

    /// Palette entry after background/sprite priority. Raises sprite 0 hit.
    fn pixel_entry(&mut self, x: usize) -> u8 {
        let bg_px = if self.mask & 0x08 != 0 && (x >= 8 || self.mask & 0x02 != 0) {
            let bit = 15 - self.fine_x as u16;
            let color = ((self.shift_lo >> bit) & 1) | (((self.shift_hi >> bit) & 1) << 1);
            let pal = ((self.attr_lo >> bit) & 1) | (((self.attr_hi >> bit) & 1) << 1);
            ((pal << 2) | color) as u8
        } else {
            0
        };
        let bg_opaque = bg_px & 3 != 0;

        let sprite = if self.mask & 0x10 != 0 && (x >= 8 || self.mask & 0x04 != 0) {
            self.sprite_at(x)
        } else {
            None
        };
        match sprite {
            Some((entry, behind, zero)) => {
                if zero && bg_opaque && x != 255 {
                    self.status |= 0x40;
                }
                if !behind || !bg_opaque {
                    entry
                } else {
                    bg_px
                }
            }
            None if bg_opaque => bg_px,
            None => 0,
        }
    }

    /// First opaque sprite pixel at column `x`: (palette entry, behind bg, sprite 0)
    fn sprite_at(&self, x: usize) -> Option<(u8, bool, bool)> {
        let active = &self.sprites[..self.sprite_count as usize];
        for (slot, sprite) in active.iter().enumerate() {
            let col = x.wrapping_sub(sprite.x as usize);
            if col >= 8 {
                continue;
            }
            let bit = if sprite.attr & 0x40 != 0 { col } else { 7 - col };
            let color = ((sprite.lo >> bit) & 1) | (((sprite.hi >> bit) & 1) << 1);
            if color != 0 {
                let entry = 0x10 | ((sprite.attr & 0x03) << 2) | color;
                let zero = slot == 0 && self.sprite0_in_line;
                return Some((entry, sprite.attr & 0x20 != 0, zero));
            }
        }
        None
    }

    /// Select and fetch the sprites of the next line.
    fn evaluate_sprites(&mut self, board: &mut dyn Board) {
        self.sprite_count = 0;
        self.sprite0_in_line = false;
        if !self.rendering_enabled() {
            return;
        }

        let tall = self.ctrl & 0x20 != 0;
        let height: i16 = if tall { 16 } else { 8 };
        let mut found = [0usize; SPRITE_SLOTS];
        let mut count = 0;

        if self.scanline != self.pre_render_line() {
            for n in 0..64 {
                let row = self.scanline as i16 - self.oam[n * 4] as i16;
                if row < 0 || row >= height {
                    continue;
                }
                if count == SPRITE_SLOTS {
                    self.status |= 0x20;
                    break;
                }
                found[count] = n;
                count += 1;
            }
        }

        for (slot, &n) in found.iter().enumerate() {
            let (tile, attr, x, row) = if slot < count {
                let o = n * 4;
                let row = self.scanline as i16 - self.oam[o] as i16;
                (self.oam[o + 1], self.oam[o + 2], self.oam[o + 3], row as u16)
            } else {
                // Empty slots still fetch tile $FF.
                (0xFF, 0, 0xFF, 0)
            };
            let row = if attr & 0x80 != 0 {
                height as u16 - 1 - row
            } else {
                row
            };
            let addr = if tall {
                let table = ((tile & 1) as u16) << 12;
                let index = (tile & 0xFE) as u16 + (row >> 3);
                table | (index << 4) | (row & 7)
            } else {
                let table: u16 = if self.ctrl & 0x08 != 0 { 0x1000 } else { 0 };
                table | ((tile as u16) << 4) | row
            };
            let lo = Self::fetch_chr(board, addr);
            let hi = Self::fetch_chr(board, addr + 8);
            if slot < count {
                self.sprites[slot] = SpriteSlot { x, attr, lo, hi };
            }
        }

        self.sprite_count = count as u8;
        self.sprite0_in_line = count > 0 && found[0] == 0;
    }
}

impl SyncState for Ppu {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
        let mut slots: Vec<u8> = self
            .sprites
            .iter()
            .flat_map(|sp| [sp.x, sp.attr, sp.lo, sp.hi])
            .collect();

        s.begin_section("PPU")?;
        s.sync_u8("Ctrl", &mut self.ctrl)?;
        s.sync_u8("Mask", &mut self.mask)?;
        s.sync_u8("Status", &mut self.status)?;
        s.sync_u8("OamAddr", &mut self.oam_addr)?;
        s.sync_u16("V", &mut self.v)?;
        s.sync_u16("T", &mut self.t)?;
        s.sync_u8("FineX", &mut self.fine_x)?;
        s.sync_bool("W", &mut self.w)?;
        s.sync_u8("ReadBuffer", &mut self.read_buffer)?;
        s.sync_u8("IoDb", &mut self.io_db)?;
        s.sync_bytes("Ciram", &mut self.ciram)?;
        s.sync_bytes("Palette", &mut self.palette)?;
        s.sync_bytes("Oam", &mut self.oam)?;
        s.sync_u16("Scanline", &mut self.scanline)?;
        s.sync_u16("Dot", &mut self.dot)?;
        s.sync_bool("OddFrame", &mut self.odd_frame)?;
        s.sync_u16("ShiftLo", &mut self.shift_lo)?;
        s.sync_u16("ShiftHi", &mut self.shift_hi)?;
        s.sync_u16("AttrLo", &mut self.attr_lo)?;
        s.sync_u16("AttrHi", &mut self.attr_hi)?;
        s.sync_u8("NextTile", &mut self.next_tile)?;
        s.sync_u8("NextAttr", &mut self.next_attr)?;
        s.sync_u8("NextLo", &mut self.next_lo)?;
        s.sync_u8("NextHi", &mut self.next_hi)?;
        s.sync_bytes("Sprites", &mut slots)?;
        s.sync_u8("SpriteCount", &mut self.sprite_count)?;
        s.sync_bool("Sprite0InLine", &mut self.sprite0_in_line)?;
        s.sync_bool("NmiEdge", &mut self.nmi_edge)?;
        s.sync_bool("FrameReady", &mut self.frame_ready)?;
        s.sync_words("Pixels", &mut self.pixels)?;
        s.end_section("PPU")?;

        if s.is_reader() {
            if self.scanline >= self.lines_per_frame() || self.dot >= DOTS_PER_LINE {
                return Err(StateError::InvalidValue("PPU.Scanline".into()));
            }
            if self.sprite_count as usize > SPRITE_SLOTS || self.fine_x > 7 {
                return Err(StateError::InvalidValue("PPU.SpriteCount".into()));
            }
            for (slot, bytes) in self.sprites.iter_mut().zip(slots.chunks_exact(4)) {
                *slot = SpriteSlot {
                    x: bytes[0],
                    attr: bytes[1],
                    lo: bytes[2],
                    hi: bytes[3],
                };
            }
        }
        Ok(())
    }
}
