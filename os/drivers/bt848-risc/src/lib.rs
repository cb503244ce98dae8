//! # Bt848/878 RISC programs
//!
//! The Bt848 family of PCI video decoders moves captured pixels into host
//! memory under control of a small DMA instruction stream, the *RISC
//! program*, which the chip fetches from host memory on its own. This crate
//! builds those programs:
//!
//! - [`BusAddress`] and [`BufferLayout`]: where the chip may write, as a
//!   scatter list of physically contiguous runs.
//! - [`Instruction`]: bit-exact encoding and decoding of the instruction set.
//! - [`PixelFormat`], [`VideoStandard`]: output formats and per-standard
//!   sampling constants, PLL coefficients and scaler geometry.
//! - [`ProgramArea`]: fixed-capacity DMA-visible instruction memory, mapped
//!   through a [`BusMapper`].
//! - [`Compiler`]: turns a [`CaptureRequest`] into one program per field.
//!
//! ## Example
//! ```rust
//! use bt848_risc::*;
//!
//! struct Identity;
//! impl BusMapper for Identity {
//!     fn map_contiguous(&self, _ptr: *const u8, _bytes: usize) -> Option<BusAddress> {
//!         Some(BusAddress::new(0x0100_0000))
//!     }
//! }
//!
//! let mut odd = ProgramArea::new(DEFAULT_PROGRAM_WORDS, &Identity).unwrap();
//! let mut even = ProgramArea::new(DEFAULT_PROGRAM_WORDS, &Identity).unwrap();
//! let links = FieldLinks {
//!     odd_return: BusAddress::new(0x0200_0018),
//!     even_return: BusAddress::new(0x0200_0030),
//! };
//!
//! let request = CaptureRequest::new(PixelFormat::Yuyv, 640, 480);
//! let layout =
//!     BufferLayout::contiguous(BusAddress::new(0x0800_0000), request.frame_bytes()).unwrap();
//! let frame = Compiler::new(VideoStandard::Ntsc.timing(), links)
//!     .compile(&request, &layout, &mut odd, &mut even)
//!     .unwrap();
//! assert!(frame.interlaced);
//! assert_eq!(frame.bytes, request.frame_bytes());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod address;
mod compiler;
mod format;
mod instruction;
mod layout;
mod program;
mod timing;

pub use address::{BusAddress, PAGE_SIZE};
pub use compiler::{
    CaptureRequest, CompileError, CompiledFrame, Compiler, FieldLinks, MIN_HEIGHT, MIN_WIDTH,
};
pub use format::{FormatLayout, PixelFormat, RAW_BYTES_PER_LINE, RAW_LINES_PER_FIELD};
pub use instruction::{
    DecodeError, Encoded, FieldOverflow, FifoStatus, Instruction, JumpFlags, LineFlags,
    MAX_BYTE_COUNT, MAX_INSTRUCTION_WORDS, Opcode, PlanarLengths, RiscCommand, risc_status,
};
pub use layout::{BufferLayout, LayoutCursor, LayoutError, PhysRun};
pub use program::{
    AreaError, BusMapper, DEFAULT_PROGRAM_WORDS, HhdmBusMapper, Instructions, ProgramArea,
    ProgramWriter,
};
pub use timing::{
    NTSC_FSC_HZ, PAL_FSC_HZ, PLL_X, PllCoefficients, ScalerGeometry, VideoStandard,
    VideoStandardTiming,
};
