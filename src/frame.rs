//! RTU frame model and builders
//!
//! A [`Frame`] owns its payload in a fixed-capacity stack buffer, so a frame
//! is released as soon as it goes out of scope and copying one (for example
//! into the outbound queue) is a bounded, checked copy.
//!
//! ```text
//! address(1) | function_code(1) | payload(0..252) | crc_lo(1) | crc_hi(1)
//! ```

use heapless::Vec as BoundedVec;
use tracing::debug;

use crate::checksum;
use crate::constants::{
    BROADCAST_ADDRESS, COIL_OFF, COIL_ON, EXCEPTION_FLAG, MAX_ADU_SIZE, MAX_PAYLOAD_SIZE,
    MIN_FRAME_SIZE,
};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{DiagnosticSubFunction, ExceptionCode, ModbusFunction, SlaveId};

/// Owned, bounded frame payload
pub type Payload = BoundedVec<u8, MAX_PAYLOAD_SIZE>;

/// Serialized frame as it appears on the wire
pub type WireBuffer = BoundedVec<u8, MAX_ADU_SIZE>;

/// A Modbus RTU frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: SlaveId,
    pub function_code: u8,
    pub payload: Payload,
    pub crc: u16,
}

impl Frame {
    /// Create a frame and compute its CRC
    pub fn new(address: SlaveId, function_code: u8, payload: &[u8]) -> ModbusResult<Self> {
        let payload = Self::copy_payload(payload)?;
        let crc = checksum::compute_parts(address, function_code, &payload);
        Ok(Self {
            address,
            function_code,
            payload,
            crc,
        })
    }

    /// Create a frame carrying an already-known CRC (received frames)
    pub fn with_crc(
        address: SlaveId,
        function_code: u8,
        payload: &[u8],
        crc: u16,
    ) -> ModbusResult<Self> {
        Ok(Self {
            address,
            function_code,
            payload: Self::copy_payload(payload)?,
            crc,
        })
    }

    /// Placeholder handed to the error callback when no frame could be parsed
    pub fn empty() -> Self {
        Self {
            address: 0,
            function_code: 0,
            payload: Payload::new(),
            crc: 0,
        }
    }

    /// Split raw wire bytes into fields. The CRC is taken as received and
    /// not verified here.
    pub fn from_wire(bytes: &[u8]) -> ModbusResult<Self> {
        if bytes.len() < MIN_FRAME_SIZE {
            return Err(ModbusError::frame(format!(
                "RTU frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes.len() > MAX_ADU_SIZE {
            return Err(ModbusError::frame(format!(
                "RTU frame too large: {} bytes",
                bytes.len()
            )));
        }

        let crc_pos = bytes.len() - 2;
        let crc = u16::from_le_bytes([bytes[crc_pos], bytes[crc_pos + 1]]);
        Self::with_crc(bytes[0], bytes[1], &bytes[2..crc_pos], crc)
    }

    /// Serialize: address, function code, payload, CRC low byte, CRC high byte
    pub fn to_bytes(&self) -> WireBuffer {
        let mut out = WireBuffer::new();
        // Payload is bounded to 252 bytes, so the frame always fits in 256.
        let _ = out.push(self.address);
        let _ = out.push(self.function_code);
        let _ = out.extend_from_slice(&self.payload);
        let _ = out.extend_from_slice(&self.crc.to_le_bytes());
        out
    }

    /// Number of bytes this frame occupies on the wire
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.payload.len() + MIN_FRAME_SIZE
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.address == BROADCAST_ADDRESS
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_FLAG != 0
    }

    /// Exception code of an exception response
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        if self.is_exception() {
            self.payload.first().copied().and_then(ExceptionCode::from_u8)
        } else {
            None
        }
    }

    /// Turn an exception response into an error
    pub fn check_exception(&self) -> ModbusResult<()> {
        if !self.is_exception() {
            return Ok(());
        }
        match self.exception_code() {
            Some(code) => Err(ModbusError::Exception {
                function: self.function_code & !EXCEPTION_FLAG,
                code,
            }),
            None => Err(ModbusError::protocol(format!(
                "Invalid exception response for function 0x{:02X}",
                self.function_code & !EXCEPTION_FLAG
            ))),
        }
    }

    /// Big-endian word at payload byte offset `offset`
    #[inline]
    pub fn word(&self, offset: usize) -> Option<u16> {
        match self.payload.get(offset..offset + 2) {
            Some(&[hi, lo]) => Some(u16::from_be_bytes([hi, lo])),
            _ => None,
        }
    }

    /// Decode the register values of an FC03/FC04 response
    pub fn registers(&self) -> ModbusResult<Vec<u16>> {
        self.check_exception()?;
        let (byte_count, data) = self.byte_counted_data()?;
        if byte_count % 2 != 0 {
            return Err(ModbusError::protocol(format!(
                "Odd register byte count: {}",
                byte_count
            )));
        }
        Ok(data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Decode the first `count` bits of an FC01/FC02 response
    pub fn bits(&self, count: u16) -> ModbusResult<Vec<bool>> {
        self.check_exception()?;
        let (_, data) = self.byte_counted_data()?;
        if data.len() * 8 < count as usize {
            return Err(ModbusError::protocol(format!(
                "Response carries {} bits, {} requested",
                data.len() * 8,
                count
            )));
        }
        Ok((0..count as usize)
            .map(|i| (data[i / 8] >> (i % 8)) & 0x01 != 0)
            .collect())
    }

    fn byte_counted_data(&self) -> ModbusResult<(usize, &[u8])> {
        let byte_count = *self
            .payload
            .first()
            .ok_or_else(|| ModbusError::protocol("Empty response payload"))?
            as usize;
        let data = self.payload.get(1..1 + byte_count).ok_or_else(|| {
            ModbusError::protocol(format!(
                "Byte count {} exceeds payload of {} bytes",
                byte_count,
                self.payload.len() - 1
            ))
        })?;
        Ok((byte_count, data))
    }

    fn copy_payload(payload: &[u8]) -> ModbusResult<Payload> {
        Payload::from_slice(payload).map_err(|_| {
            ModbusError::frame(format!(
                "Payload too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            ))
        })
    }
}

/// Frame builder - fluent API
///
/// The CRC is computed once, in [`FrameBuilder::build`], over everything
/// pushed so far. Multi-byte fields are big-endian.
pub struct FrameBuilder {
    address: SlaveId,
    function_code: u8,
    payload: Payload,
}

impl FrameBuilder {
    #[inline]
    pub fn new(address: SlaveId, function_code: u8) -> Self {
        Self {
            address,
            function_code,
            payload: Payload::new(),
        }
    }

    /// Add a byte
    #[inline]
    pub fn byte(mut self, b: u8) -> ModbusResult<Self> {
        self.payload
            .push(b)
            .map_err(|_| ModbusError::frame("Payload buffer full"))?;
        Ok(self)
    }

    /// Add a big-endian word (address, quantity or value)
    #[inline]
    pub fn word(self, value: u16) -> ModbusResult<Self> {
        self.byte((value >> 8) as u8)?.byte((value & 0xFF) as u8)
    }

    /// Add data
    #[inline]
    pub fn data(mut self, data: &[u8]) -> ModbusResult<Self> {
        if self.payload.len() + data.len() > MAX_PAYLOAD_SIZE {
            return Err(ModbusError::frame(format!(
                "Payload would exceed max size: {} + {} > {}",
                self.payload.len(),
                data.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        let _ = self.payload.extend_from_slice(data);
        Ok(self)
    }

    /// Add bits packed LSB-first, eight per byte
    pub fn packed_bits(mut self, bits: &[bool]) -> ModbusResult<Self> {
        for chunk in bits.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &bit)| if bit { acc | (1 << i) } else { acc });
            self = self.byte(byte)?;
        }
        Ok(self)
    }

    /// Build the frame
    pub fn build(self) -> Frame {
        let crc = checksum::compute_parts(self.address, self.function_code, &self.payload);
        debug!(
            "Frame built: addr={} FC={:02X} ({}), payload_len={}",
            self.address,
            self.function_code,
            ModbusFunction::description(self.function_code),
            self.payload.len()
        );
        Frame {
            address: self.address,
            function_code: self.function_code,
            payload: self.payload,
            crc,
        }
    }

    // ===== Requests (master -> slave) =====

    /// Build a read request for FC01-04
    pub fn read_request(
        address: SlaveId,
        function: ModbusFunction,
        start_address: u16,
        quantity: u16,
    ) -> ModbusResult<Frame> {
        if !matches!(
            function,
            ModbusFunction::ReadCoils
                | ModbusFunction::ReadDiscreteInputs
                | ModbusFunction::ReadHoldingRegisters
                | ModbusFunction::ReadInputRegisters
        ) {
            return Err(ModbusError::InvalidFunction {
                code: function.to_u8(),
            });
        }
        Ok(FrameBuilder::new(address, function.to_u8())
            .word(start_address)?
            .word(quantity)?
            .build())
    }

    pub fn read_coils_request(address: SlaveId, start: u16, count: u16) -> ModbusResult<Frame> {
        Self::read_request(address, ModbusFunction::ReadCoils, start, count)
    }

    pub fn read_discrete_inputs_request(
        address: SlaveId,
        start: u16,
        count: u16,
    ) -> ModbusResult<Frame> {
        Self::read_request(address, ModbusFunction::ReadDiscreteInputs, start, count)
    }

    pub fn read_holding_registers_request(
        address: SlaveId,
        start: u16,
        count: u16,
    ) -> ModbusResult<Frame> {
        Self::read_request(address, ModbusFunction::ReadHoldingRegisters, start, count)
    }

    pub fn read_input_registers_request(
        address: SlaveId,
        start: u16,
        count: u16,
    ) -> ModbusResult<Frame> {
        Self::read_request(address, ModbusFunction::ReadInputRegisters, start, count)
    }

    /// FC05; `true` is encoded as 0xFF00, `false` as 0x0000
    pub fn write_single_coil_request(
        address: SlaveId,
        coil: u16,
        value: bool,
    ) -> ModbusResult<Frame> {
        Ok(FrameBuilder::new(address, ModbusFunction::WriteSingleCoil.to_u8())
            .word(coil)?
            .word(if value { COIL_ON } else { COIL_OFF })?
            .build())
    }

    pub fn write_single_register_request(
        address: SlaveId,
        register: u16,
        value: u16,
    ) -> ModbusResult<Frame> {
        Ok(
            FrameBuilder::new(address, ModbusFunction::WriteSingleRegister.to_u8())
                .word(register)?
                .word(value)?
                .build(),
        )
    }

    /// FC15; byte count is `ceil(values.len() / 8)`
    pub fn write_multiple_coils_request(
        address: SlaveId,
        start: u16,
        values: &[bool],
    ) -> ModbusResult<Frame> {
        let byte_count = bit_byte_count(values.len())?;
        Ok(
            FrameBuilder::new(address, ModbusFunction::WriteMultipleCoils.to_u8())
                .word(start)?
                .word(values.len() as u16)?
                .byte(byte_count)?
                .packed_bits(values)?
                .build(),
        )
    }

    /// FC16; byte count is `2 × values.len()`
    pub fn write_multiple_registers_request(
        address: SlaveId,
        start: u16,
        values: &[u16],
    ) -> ModbusResult<Frame> {
        let byte_count = register_byte_count(values.len())?;
        let mut builder = FrameBuilder::new(address, ModbusFunction::WriteMultipleRegisters.to_u8())
            .word(start)?
            .word(values.len() as u16)?
            .byte(byte_count)?;
        for &value in values {
            builder = builder.word(value)?;
        }
        Ok(builder.build())
    }

    pub fn diagnostics_request(
        address: SlaveId,
        sub_function: u16,
        data: u16,
    ) -> ModbusResult<Frame> {
        Ok(FrameBuilder::new(address, ModbusFunction::Diagnostics.to_u8())
            .word(sub_function)?
            .word(data)?
            .build())
    }

    // ===== Responses (slave -> master) =====

    pub fn read_coils_response(address: SlaveId, values: &[bool]) -> ModbusResult<Frame> {
        Self::bits_response(address, ModbusFunction::ReadCoils, values)
    }

    pub fn read_discrete_inputs_response(
        address: SlaveId,
        values: &[bool],
    ) -> ModbusResult<Frame> {
        Self::bits_response(address, ModbusFunction::ReadDiscreteInputs, values)
    }

    /// FC03/FC04 response: byte count then big-endian words
    pub fn read_registers_response(
        address: SlaveId,
        function: ModbusFunction,
        values: &[u16],
    ) -> ModbusResult<Frame> {
        let byte_count = register_byte_count(values.len())?;
        let mut builder = FrameBuilder::new(address, function.to_u8()).byte(byte_count)?;
        for &value in values {
            builder = builder.word(value)?;
        }
        Ok(builder.build())
    }

    /// Echo of the request
    pub fn write_single_coil_response(
        address: SlaveId,
        coil: u16,
        value: bool,
    ) -> ModbusResult<Frame> {
        Self::write_single_coil_request(address, coil, value)
    }

    /// Echo of the request
    pub fn write_single_register_response(
        address: SlaveId,
        register: u16,
        value: u16,
    ) -> ModbusResult<Frame> {
        Self::write_single_register_request(address, register, value)
    }

    pub fn write_multiple_coils_response(
        address: SlaveId,
        start: u16,
        count: u16,
    ) -> ModbusResult<Frame> {
        Ok(
            FrameBuilder::new(address, ModbusFunction::WriteMultipleCoils.to_u8())
                .word(start)?
                .word(count)?
                .build(),
        )
    }

    pub fn write_multiple_registers_response(
        address: SlaveId,
        start: u16,
        count: u16,
    ) -> ModbusResult<Frame> {
        Ok(
            FrameBuilder::new(address, ModbusFunction::WriteMultipleRegisters.to_u8())
                .word(start)?
                .word(count)?
                .build(),
        )
    }

    pub fn diagnostics_response(
        address: SlaveId,
        sub_function: DiagnosticSubFunction,
        data: u16,
    ) -> ModbusResult<Frame> {
        Self::diagnostics_request(address, sub_function.to_u16(), data)
    }

    /// Exception response: function code with bit 7 set, one-byte exception code
    pub fn exception_response(
        address: SlaveId,
        function_code: u8,
        code: ExceptionCode,
    ) -> ModbusResult<Frame> {
        Ok(FrameBuilder::new(address, function_code | EXCEPTION_FLAG)
            .byte(code.to_u8())?
            .build())
    }

    fn bits_response(
        address: SlaveId,
        function: ModbusFunction,
        values: &[bool],
    ) -> ModbusResult<Frame> {
        let byte_count = bit_byte_count(values.len())?;
        Ok(FrameBuilder::new(address, function.to_u8())
            .byte(byte_count)?
            .packed_bits(values)?
            .build())
    }
}

fn bit_byte_count(bits: usize) -> ModbusResult<u8> {
    u8::try_from(bits.div_ceil(8))
        .map_err(|_| ModbusError::frame(format!("Too many bits for one frame: {}", bits)))
}

fn register_byte_count(registers: usize) -> ModbusResult<u8> {
    u8::try_from(registers * 2).map_err(|_| {
        ModbusError::frame(format!("Too many registers for one frame: {}", registers))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new_computes_crc() {
        let frame = Frame::new(0x01, 0x03, &[0x00, 0x00, 0x00, 0x0A]).unwrap();
        assert_eq!(frame.crc, 0xCDC5);
        assert_eq!(
            frame.to_bytes().as_slice(),
            &[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]
        );
        assert_eq!(frame.wire_len(), 8);
    }

    #[test]
    fn test_payload_overflow_rejected() {
        let payload = [0u8; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            Frame::new(1, 0x10, &payload),
            Err(ModbusError::Frame { .. })
        ));
        assert!(Frame::new(1, 0x10, &payload[..MAX_PAYLOAD_SIZE]).is_ok());
    }

    #[test]
    fn test_from_wire() {
        let frame = Frame::from_wire(&[0x11, 0x06, 0x00, 0x01, 0x00, 0x03, 0x9A, 0x9B]).unwrap();
        assert_eq!(frame.address, 0x11);
        assert_eq!(frame.function_code, 0x06);
        assert_eq!(frame.payload.as_slice(), &[0x00, 0x01, 0x00, 0x03]);
        assert_eq!(frame.crc, 0x9B9A);
        assert!(checksum::verify(&frame));

        assert!(Frame::from_wire(&[0x01, 0x03, 0x00]).is_err());
    }

    #[test]
    fn test_read_request() {
        let frame = FrameBuilder::read_holding_registers_request(2, 0x006B, 3).unwrap();
        assert_eq!(frame.function_code, 0x03);
        assert_eq!(frame.payload.as_slice(), &[0x00, 0x6B, 0x00, 0x03]);
        assert!(checksum::verify(&frame));

        assert!(matches!(
            FrameBuilder::read_request(2, ModbusFunction::WriteSingleCoil, 0, 1),
            Err(ModbusError::InvalidFunction { code: 0x05 })
        ));
    }

    #[test]
    fn test_write_single_coil_request() {
        let on = FrameBuilder::write_single_coil_request(2, 28, true).unwrap();
        assert_eq!(on.payload.as_slice(), &[0x00, 0x1C, 0xFF, 0x00]);

        let off = FrameBuilder::write_single_coil_request(2, 28, false).unwrap();
        assert_eq!(off.payload.as_slice(), &[0x00, 0x1C, 0x00, 0x00]);
    }

    #[test]
    fn test_write_multiple_coils_request() {
        let values = [true, false, true, true, false, false, true, true, true, false];
        let frame = FrameBuilder::write_multiple_coils_request(1, 0x0013, &values).unwrap();
        assert_eq!(frame.function_code, 0x0F);
        assert_eq!(
            frame.payload.as_slice(),
            &[0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]
        );
    }

    #[test]
    fn test_write_multiple_registers_request() {
        let frame = FrameBuilder::write_multiple_registers_request(1, 0x0001, &[0x000A, 0x0102])
            .unwrap();
        assert_eq!(
            frame.payload.as_slice(),
            &[0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn test_too_many_registers_rejected() {
        let values = [0u16; 200];
        assert!(FrameBuilder::write_multiple_registers_request(1, 0, &values).is_err());
    }

    #[test]
    fn test_read_registers_response() {
        let frame =
            FrameBuilder::read_registers_response(2, ModbusFunction::ReadHoldingRegisters, &[42])
                .unwrap();
        assert_eq!(frame.payload.as_slice(), &[0x02, 0x00, 0x2A]);
        assert_eq!(frame.registers().unwrap(), vec![42]);
    }

    #[test]
    fn test_read_coils_response() {
        let values = [true, false, true, false, false, false, false, false, true];
        let frame = FrameBuilder::read_coils_response(3, &values).unwrap();
        assert_eq!(frame.payload.as_slice(), &[0x02, 0x05, 0x01]);
        assert_eq!(frame.bits(9).unwrap(), values.to_vec());
        assert!(frame.bits(17).is_err());
    }

    #[test]
    fn test_exception_response() {
        let frame = FrameBuilder::exception_response(2, 0x03, ExceptionCode::IllegalDataValue)
            .unwrap();
        assert_eq!(frame.function_code, 0x83);
        assert_eq!(frame.payload.as_slice(), &[0x03]);
        assert!(frame.is_exception());
        assert_eq!(frame.exception_code(), Some(ExceptionCode::IllegalDataValue));
        assert_eq!(
            frame.check_exception(),
            Err(ModbusError::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalDataValue
            })
        );
        assert!(frame.registers().is_err());
    }

    #[test]
    fn test_diagnostics_frames() {
        let request = FrameBuilder::diagnostics_request(2, 0x0000, 0xA537).unwrap();
        assert_eq!(request.function_code, 0x08);
        assert_eq!(request.payload.as_slice(), &[0x00, 0x00, 0xA5, 0x37]);

        let response =
            FrameBuilder::diagnostics_response(2, DiagnosticSubFunction::SlaveMessageCount, 7)
                .unwrap();
        assert_eq!(response.payload.as_slice(), &[0x00, 0x0E, 0x00, 0x07]);
        assert_eq!(response.word(2), Some(7));
        assert_eq!(response.word(3), None);
    }
}
