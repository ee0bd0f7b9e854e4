//! Slave data model
//!
//! Registers are contiguous arrays starting at address 0. Coils and discrete
//! inputs are sparse: only the addresses supplied when the table is enabled
//! exist. A table that has not been enabled does not exist at all.

use std::collections::BTreeMap;

use crate::error::{ModbusError, ModbusResult};

const HOLDING: &str = "Holding registers";
const INPUT: &str = "Input registers";
const COILS: &str = "Coils";
const DISCRETE: &str = "Discrete inputs";

/// Does `[start, start + count)` fit inside an array of `size` entries?
#[inline]
fn range_fits(start: u16, count: u16, size: usize) -> bool {
    u32::from(start) + u32::from(count) <= size as u32
}

/// Is every address of `[start, start + count)` present in `map`?
fn all_present(map: &BTreeMap<u16, bool>, start: u16, count: u16) -> bool {
    let end = u32::from(start) + u32::from(count);
    (u32::from(start)..end).all(|addr| {
        u16::try_from(addr).is_ok_and(|addr| map.contains_key(&addr))
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterStore {
    holding: Option<Vec<u16>>,
    input: Option<Vec<u16>>,
    coils: Option<BTreeMap<u16, bool>>,
    discrete: Option<BTreeMap<u16, bool>>,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Enable =====

    /// Allocate `size` zeroed holding registers, replacing any existing table
    pub fn enable_holding_registers(&mut self, size: u16) {
        self.holding = Some(vec![0; size as usize]);
    }

    pub fn enable_input_registers(&mut self, size: u16) {
        self.input = Some(vec![0; size as usize]);
    }

    pub fn enable_coils(&mut self, initial: BTreeMap<u16, bool>) {
        self.coils = Some(initial);
    }

    pub fn enable_discrete_inputs(&mut self, initial: BTreeMap<u16, bool>) {
        self.discrete = Some(initial);
    }

    pub fn is_holding_registers_enabled(&self) -> bool {
        self.holding.is_some()
    }

    pub fn is_input_registers_enabled(&self) -> bool {
        self.input.is_some()
    }

    pub fn is_coils_enabled(&self) -> bool {
        self.coils.is_some()
    }

    pub fn is_discrete_inputs_enabled(&self) -> bool {
        self.discrete.is_some()
    }

    // ===== Existence =====

    pub fn check_hregister_exist(&self, start: u16, count: u16) -> bool {
        self.holding
            .as_ref()
            .is_some_and(|regs| range_fits(start, count, regs.len()))
    }

    pub fn check_iregister_exist(&self, start: u16, count: u16) -> bool {
        self.input
            .as_ref()
            .is_some_and(|regs| range_fits(start, count, regs.len()))
    }

    pub fn check_coils_exist(&self, start: u16, count: u16) -> bool {
        self.coils
            .as_ref()
            .is_some_and(|map| all_present(map, start, count))
    }

    pub fn check_discrete_exist(&self, start: u16, count: u16) -> bool {
        self.discrete
            .as_ref()
            .is_some_and(|map| all_present(map, start, count))
    }

    // ===== Holding registers =====

    pub fn holding_registers(&self) -> Option<&[u16]> {
        self.holding.as_deref()
    }

    pub fn get_holding_register(&self, address: u16) -> ModbusResult<u16> {
        let regs = self.holding.as_ref().ok_or(ModbusError::Disabled { table: HOLDING })?;
        regs.get(address as usize).copied().ok_or(ModbusError::OutOfRange {
            table: HOLDING,
            address,
        })
    }

    pub fn set_holding_register(&mut self, address: u16, value: u16) -> ModbusResult<()> {
        let regs = self.holding.as_mut().ok_or(ModbusError::Disabled { table: HOLDING })?;
        let slot = regs.get_mut(address as usize).ok_or(ModbusError::OutOfRange {
            table: HOLDING,
            address,
        })?;
        *slot = value;
        Ok(())
    }

    /// Copy of `count` holding registers from `start`; caller checked range
    pub(crate) fn read_holding(&self, start: u16, count: u16) -> Option<&[u16]> {
        let regs = self.holding.as_ref()?;
        regs.get(start as usize..start as usize + count as usize)
    }

    pub(crate) fn write_holding(&mut self, start: u16, values: &[u16]) -> bool {
        let Some(regs) = self.holding.as_mut() else {
            return false;
        };
        match regs.get_mut(start as usize..start as usize + values.len()) {
            Some(dst) => {
                dst.copy_from_slice(values);
                true
            }
            None => false,
        }
    }

    // ===== Input registers =====

    pub fn input_registers(&self) -> Option<&[u16]> {
        self.input.as_deref()
    }

    pub fn get_input_register(&self, address: u16) -> ModbusResult<u16> {
        let regs = self.input.as_ref().ok_or(ModbusError::Disabled { table: INPUT })?;
        regs.get(address as usize).copied().ok_or(ModbusError::OutOfRange {
            table: INPUT,
            address,
        })
    }

    /// Application-side update of a read-only (to the bus) register
    pub fn set_input_register(&mut self, address: u16, value: u16) -> ModbusResult<()> {
        let regs = self.input.as_mut().ok_or(ModbusError::Disabled { table: INPUT })?;
        let slot = regs.get_mut(address as usize).ok_or(ModbusError::OutOfRange {
            table: INPUT,
            address,
        })?;
        *slot = value;
        Ok(())
    }

    pub(crate) fn read_input(&self, start: u16, count: u16) -> Option<&[u16]> {
        let regs = self.input.as_ref()?;
        regs.get(start as usize..start as usize + count as usize)
    }

    // ===== Coils =====

    pub fn coils(&self) -> Option<&BTreeMap<u16, bool>> {
        self.coils.as_ref()
    }

    pub fn get_coil(&self, address: u16) -> ModbusResult<bool> {
        let map = self.coils.as_ref().ok_or(ModbusError::Disabled { table: COILS })?;
        map.get(&address).copied().ok_or(ModbusError::OutOfRange {
            table: COILS,
            address,
        })
    }

    /// Update an existing coil; unknown addresses are rejected, not inserted
    pub fn set_coil(&mut self, address: u16, value: bool) -> ModbusResult<()> {
        let map = self.coils.as_mut().ok_or(ModbusError::Disabled { table: COILS })?;
        let slot = map.get_mut(&address).ok_or(ModbusError::OutOfRange {
            table: COILS,
            address,
        })?;
        *slot = value;
        Ok(())
    }

    // ===== Discrete inputs =====

    pub fn discrete_inputs(&self) -> Option<&BTreeMap<u16, bool>> {
        self.discrete.as_ref()
    }

    pub fn get_discrete_input(&self, address: u16) -> ModbusResult<bool> {
        let map = self
            .discrete
            .as_ref()
            .ok_or(ModbusError::Disabled { table: DISCRETE })?;
        map.get(&address).copied().ok_or(ModbusError::OutOfRange {
            table: DISCRETE,
            address,
        })
    }

    pub fn set_discrete_input(&mut self, address: u16, value: bool) -> ModbusResult<()> {
        let map = self
            .discrete
            .as_mut()
            .ok_or(ModbusError::Disabled { table: DISCRETE })?;
        let slot = map.get_mut(&address).ok_or(ModbusError::OutOfRange {
            table: DISCRETE,
            address,
        })?;
        *slot = value;
        Ok(())
    }

    /// Values of `count` bits from `start`; `None` if any address is missing
    pub(crate) fn read_bits(
        map: &BTreeMap<u16, bool>,
        start: u16,
        count: u16,
    ) -> Option<Vec<bool>> {
        (0..count)
            .map(|i| start.checked_add(i).and_then(|addr| map.get(&addr).copied()))
            .collect()
    }
}
