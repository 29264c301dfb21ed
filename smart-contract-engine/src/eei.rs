//! The environment interface: every host function a contract may import,
//! plus the debug print surface. Each function follows the same shape — gas
//! charge, argument marshalling, side effect, result marshalling — and pays
//! through the gas meter before (or while) doing the work it prices.

use crate::{
    constants::*,
    interpreter::Interpreter,
    linker::ResolvedImport,
    memory,
    registry::{DebugFunc, EnvFunc},
    state::LogEntry,
    types::{Address, CallKind, CallResult, Contract, RuntimeError, TerminateType, Word},
    ExecResult,
};
use anyhow::bail;
use tinyvec::ArrayVec;
use wasm_machine::machine::{HostOutcome, ModuleLoader, RunResult, Value};

fn arg_i32(args: &[Value], index: usize) -> ExecResult<i32> {
    match args.get(index) {
        Some(Value::I32(x)) => Ok(*x),
        _ => bail!("host call argument {} has the wrong kind", index),
    }
}

fn arg_u32(args: &[Value], index: usize) -> ExecResult<u32> {
    Ok(arg_i32(args, index)? as u32)
}

fn arg_i64(args: &[Value], index: usize) -> ExecResult<i64> {
    match args.get(index) {
        Some(Value::I64(x)) => Ok(*x),
        _ => bail!("host call argument {} has the wrong kind", index),
    }
}

fn resume_none() -> RunResult<HostOutcome> { Ok(HostOutcome::Resume(None)) }

fn resume_i32(x: i32) -> RunResult<HostOutcome> {
    Ok(HostOutcome::Resume(Some(Value::I32(x))))
}

fn resume_i64(x: i64) -> RunResult<HostOutcome> {
    Ok(HostOutcome::Resume(Some(Value::I64(x))))
}

fn resume_code(code: CallResult) -> RunResult<HostOutcome> { resume_i32(code.into()) }

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl<'a, L: ModuleLoader<ResolvedImport>> Interpreter<'a, L> {
    pub(crate) fn call_env(
        &mut self,
        func: EnvFunc,
        memory: &mut Vec<u8>,
        args: &[Value],
    ) -> RunResult<HostOutcome> {
        match func {
            EnvFunc::UseGas => {
                self.use_gas(arg_i64(args, 0)? as u64)?;
                resume_none()
            }
            EnvFunc::GetAddress => {
                self.use_gas(BASE_GAS)?;
                let address = self.frame()?.contract.address;
                memory::write_address(memory, arg_u32(args, 0)?, &address)?;
                resume_none()
            }
            EnvFunc::GetCaller => {
                self.use_gas(BASE_GAS)?;
                let caller = self.frame()?.contract.caller;
                memory::write_address(memory, arg_u32(args, 0)?, &caller)?;
                resume_none()
            }
            EnvFunc::GetCallValue => {
                self.use_gas(BASE_GAS)?;
                let value = self.frame()?.contract.value;
                memory::write_value(memory, arg_u32(args, 0)?, value)?;
                resume_none()
            }
            EnvFunc::GetExternalBalance => {
                self.use_gas(BALANCE_GAS)?;
                let address = memory::read_address(memory, arg_u32(args, 0)?)?;
                let balance = self.state.get_balance(&address);
                memory::write_value(memory, arg_u32(args, 1)?, balance)?;
                resume_none()
            }
            EnvFunc::GetBlockHash => {
                let number = arg_i64(args, 0)?;
                let result_offset = arg_u32(args, 1)?;
                // the lookup is priced whether or not the block is in range
                self.use_gas(BLOCK_HASH_GAS)?;
                let height = self.chain.block_height();
                let in_window = number >= 0
                    && (number as u64) < height
                    && height - number as u64 <= BLOCK_HASH_WINDOW;
                if !in_window {
                    return resume_code(CallResult::Failure);
                }
                let hash = self.chain.block_hash(number as u64);
                memory::write_word(memory, result_offset, &hash)?;
                resume_code(CallResult::Success)
            }
            EnvFunc::StorageLoad => {
                self.use_gas(STORAGE_LOAD_GAS)?;
                let key = memory::read_word(memory, arg_u32(args, 0)?)?;
                let address = self.frame()?.contract.address;
                let value = self.state.get_state(&address, &key);
                memory::write_word(memory, arg_u32(args, 1)?, &value)?;
                resume_none()
            }
            EnvFunc::StorageStore => {
                if self.frame()?.read_only {
                    bail!(RuntimeError::StaticModeViolation);
                }
                let key = memory::read_word(memory, arg_u32(args, 0)?)?;
                let value = memory::read_word(memory, arg_u32(args, 1)?)?;
                let address = self.frame()?.contract.address;
                let current = self.state.get_state(&address, &key);
                let cost = if current.is_zero() && !value.is_zero() {
                    STORAGE_SET_GAS
                } else if !current.is_zero() && value.is_zero() {
                    STORAGE_CLEAR_GAS
                } else {
                    STORAGE_RESET_GAS
                };
                self.use_gas(cost)?;
                self.state.set_state(&address, key, value);
                resume_none()
            }
            EnvFunc::CallDataCopy => {
                let result_offset = arg_u32(args, 0)?;
                let data_offset = arg_u32(args, 1)?;
                let length = arg_u32(args, 2)?;
                self.use_gas(copy_cost(length))?;
                let data = memory::read_bytes(&self.frame()?.contract.input, data_offset, length)?;
                memory::write_bytes(memory, result_offset, &data)?;
                resume_none()
            }
            EnvFunc::GetCallDataSize => {
                self.use_gas(BASE_GAS)?;
                resume_i32(self.frame()?.contract.input.len() as i32)
            }
            EnvFunc::CodeCopy => {
                let result_offset = arg_u32(args, 0)?;
                let code_offset = arg_u32(args, 1)?;
                let length = arg_u32(args, 2)?;
                self.use_gas(copy_cost(length))?;
                let code = memory::read_bytes(&self.frame()?.contract.code, code_offset, length)?;
                memory::write_bytes(memory, result_offset, &code)?;
                resume_none()
            }
            EnvFunc::GetCodeSize => {
                self.use_gas(BASE_GAS)?;
                resume_i32(self.frame()?.contract.code.len() as i32)
            }
            EnvFunc::ExternalCodeCopy => {
                let address_offset = arg_u32(args, 0)?;
                let result_offset = arg_u32(args, 1)?;
                let code_offset = arg_u32(args, 2)?;
                let length = arg_u32(args, 3)?;
                self.use_gas(EXTERNAL_CODE_GAS + copy_cost(length))?;
                let address = memory::read_address(memory, address_offset)?;
                let code = self.state.get_code(&address);
                let data = memory::read_bytes(&code, code_offset, length)?;
                memory::write_bytes(memory, result_offset, &data)?;
                resume_none()
            }
            EnvFunc::GetExternalCodeSize => {
                self.use_gas(EXTERNAL_CODE_GAS)?;
                let address = memory::read_address(memory, arg_u32(args, 0)?)?;
                resume_i32(self.state.get_code(&address).len() as i32)
            }
            EnvFunc::ReturnDataCopy => {
                let result_offset = arg_u32(args, 0)?;
                let data_offset = arg_u32(args, 1)?;
                let length = arg_u32(args, 2)?;
                self.use_gas(copy_cost(length))?;
                let data = memory::read_bytes(&self.frame()?.return_data, data_offset, length)?;
                memory::write_bytes(memory, result_offset, &data)?;
                resume_none()
            }
            EnvFunc::GetReturnDataSize => {
                self.use_gas(BASE_GAS)?;
                resume_i32(self.frame()?.return_data.len() as i32)
            }
            EnvFunc::GetGasLeft => {
                self.use_gas(BASE_GAS)?;
                resume_i64(self.frame()?.contract.gas as i64)
            }
            EnvFunc::GetBlockCoinbase => {
                self.use_gas(BASE_GAS)?;
                let coinbase = self.chain.coinbase();
                memory::write_address(memory, arg_u32(args, 0)?, &coinbase)?;
                resume_none()
            }
            EnvFunc::GetBlockDifficulty => {
                self.use_gas(BASE_GAS)?;
                let difficulty = self.chain.difficulty();
                memory::write_word(memory, arg_u32(args, 0)?, &difficulty)?;
                resume_none()
            }
            EnvFunc::GetBlockGasLimit => {
                self.use_gas(BASE_GAS)?;
                resume_i64(self.chain.gas_limit() as i64)
            }
            EnvFunc::GetBlockNumber => {
                self.use_gas(BASE_GAS)?;
                resume_i64(self.chain.block_height() as i64)
            }
            EnvFunc::GetBlockTimestamp => {
                self.use_gas(BASE_GAS)?;
                resume_i64(self.chain.timestamp() as i64)
            }
            EnvFunc::GetTxGasPrice => {
                self.use_gas(BASE_GAS)?;
                let price = self.chain.gas_price();
                memory::write_value(memory, arg_u32(args, 0)?, price)?;
                resume_none()
            }
            EnvFunc::GetTxOrigin => {
                self.use_gas(BASE_GAS)?;
                let origin = self.chain.origin();
                memory::write_address(memory, arg_u32(args, 0)?, &origin)?;
                resume_none()
            }
            EnvFunc::Log => self.do_log(memory, args),
            EnvFunc::Finish => self.do_exit(TerminateType::Finish, memory, args),
            EnvFunc::Revert => self.do_exit(TerminateType::Revert, memory, args),
            EnvFunc::SelfDestruct => self.do_self_destruct(memory, args),
            EnvFunc::Call => self.do_call(CallKind::Call, memory, args),
            EnvFunc::CallCode => self.do_call(CallKind::CallCode, memory, args),
            EnvFunc::CallDelegate => self.do_call(CallKind::DelegateCall, memory, args),
            EnvFunc::CallStatic => self.do_call(CallKind::StaticCall, memory, args),
            EnvFunc::Create => self.do_create(memory, args),
        }
    }

    fn do_log(&mut self, memory: &mut Vec<u8>, args: &[Value]) -> RunResult<HostOutcome> {
        let data_offset = arg_u32(args, 0)?;
        let data_length = arg_u32(args, 1)?;
        let topic_count = arg_i32(args, 2)?;
        if !(0..=4).contains(&topic_count) {
            bail!(RuntimeError::InvalidTopicCount(topic_count));
        }
        if self.frame()?.read_only {
            bail!(RuntimeError::StaticModeViolation);
        }
        self.use_gas(
            LOG_GAS + LOG_TOPIC_GAS * topic_count as u64 + LOG_DATA_GAS * u64::from(data_length),
        )?;
        let mut topics: ArrayVec<[Word; 4]> = ArrayVec::new();
        for i in 0..topic_count as usize {
            topics.push(memory::read_word(memory, arg_u32(args, 3 + i)?)?);
        }
        let data = memory::read_bytes(memory, data_offset, data_length)?;
        let entry = LogEntry {
            address: self.frame()?.contract.address,
            topics,
            data,
            block_height: self.chain.block_height(),
        };
        self.state.add_log(entry);
        resume_none()
    }

    /// `finish` and `revert`: capture return data and stop the machine. This
    /// is a non-local exit; no further instructions of the frame run.
    fn do_exit(
        &mut self,
        terminate: TerminateType,
        memory: &mut Vec<u8>,
        args: &[Value],
    ) -> RunResult<HostOutcome> {
        let data = memory::read_bytes(memory, arg_u32(args, 0)?, arg_u32(args, 1)?)?;
        let frame = self.frame_mut()?;
        frame.return_data = data;
        frame.terminate = terminate;
        Ok(HostOutcome::Halt)
    }

    fn do_self_destruct(&mut self, memory: &mut Vec<u8>, args: &[Value]) -> RunResult<HostOutcome> {
        if self.frame()?.read_only {
            bail!(RuntimeError::StaticModeViolation);
        }
        let beneficiary = memory::read_address(memory, arg_u32(args, 0)?)?;
        let mut cost = SELF_DESTRUCT_GAS;
        if !self.state.exists(&beneficiary) {
            cost += NEW_ACCOUNT_GAS;
        }
        self.use_gas(cost)?;
        let address = self.frame()?.contract.address;
        let balance = self.state.get_balance(&address);
        self.state.add_balance(&beneficiary, balance);
        self.state.suicide(&address);
        self.frame_mut()?.terminate = TerminateType::Suicide;
        Ok(HostOutcome::Halt)
    }

    fn do_call(
        &mut self,
        kind: CallKind,
        memory: &mut Vec<u8>,
        args: &[Value],
    ) -> RunResult<HostOutcome> {
        self.use_gas(CALL_GAS)?;
        let gas_requested = arg_i64(args, 0)? as u64;
        let target = memory::read_address(memory, arg_u32(args, 1)?)?;
        let (value, input_arg) = match kind {
            CallKind::Call | CallKind::CallCode => {
                (memory::read_value(memory, arg_u32(args, 2)?)?, 3)
            }
            // a delegate frame has no independent value semantics
            CallKind::DelegateCall => (self.frame()?.contract.value, 2),
            CallKind::StaticCall => (0, 2),
        };
        let input = memory::read_bytes(
            memory,
            arg_u32(args, input_arg)?,
            arg_u32(args, input_arg + 1)?,
        )?;

        if kind == CallKind::Call && value != 0 && self.frame()?.read_only {
            bail!(RuntimeError::StaticModeViolation);
        }
        if value != 0 && matches!(kind, CallKind::Call | CallKind::CallCode) {
            self.use_gas(CALL_VALUE_GAS)?;
        }

        let from = self.frame()?.contract.address;
        if matches!(kind, CallKind::Call | CallKind::CallCode)
            && !self.chain.can_transfer(&*self.state, &from, value)
        {
            self.frame_mut()?.return_data.clear();
            return resume_code(CallResult::Failure);
        }

        let forwarded = gas_requested.min(self.frame()?.contract.gas);
        self.use_gas(forwarded)?;

        let snapshot = self.state.snapshot();
        if kind == CallKind::Call {
            if !self.state.exists(&target) {
                self.state.create_account(&target);
            }
            self.chain.transfer(&mut *self.state, &from, &target, value);
        }

        let (exec_address, caller, is_delegate) = match kind {
            CallKind::Call | CallKind::StaticCall => (target, from, false),
            CallKind::CallCode => (from, from, false),
            CallKind::DelegateCall => (from, self.frame()?.contract.caller, true),
        };
        let callee = Contract {
            code: self.state.get_code(&target),
            address: exec_address,
            caller,
            value,
            input: Vec::new(),
            gas: forwarded,
            is_delegate,
        };
        let read_only = self.frame()?.read_only || kind == CallKind::StaticCall;

        match self.run_frame(callee, input, read_only) {
            Err(_) => {
                self.state.revert_to_snapshot(snapshot);
                self.frame_mut()?.return_data.clear();
                resume_code(CallResult::Failure)
            }
            Ok(result) => match result.terminate {
                TerminateType::Finish => {
                    let frame = self.frame_mut()?;
                    frame.contract.gas += result.gas_left;
                    frame.return_data = result.return_data;
                    resume_code(CallResult::Success)
                }
                TerminateType::Revert => {
                    self.state.revert_to_snapshot(snapshot);
                    let frame = self.frame_mut()?;
                    frame.contract.gas += result.gas_left;
                    frame.return_data = result.return_data;
                    resume_code(CallResult::Revert)
                }
                // Suicide or Invalid surfacing here is abnormal for a clean
                // sub-call; the callee's remaining gas is forfeited
                _ => {
                    self.state.revert_to_snapshot(snapshot);
                    self.frame_mut()?.return_data.clear();
                    resume_code(CallResult::Failure)
                }
            },
        }
    }

    fn do_create(&mut self, memory: &mut Vec<u8>, args: &[Value]) -> RunResult<HostOutcome> {
        if self.frame()?.read_only {
            bail!(RuntimeError::StaticModeViolation);
        }
        self.use_gas(CREATE_GAS)?;
        let value_offset = arg_u32(args, 0)?;
        let data_offset = arg_u32(args, 1)?;
        let length = arg_u32(args, 2)?;
        let result_offset = arg_u32(args, 3)?;

        // both slices are bounds-checked up front; an out-of-range request is
        // a failed creation, not a trap
        if !memory::in_bounds(memory, value_offset, crate::types::VALUE_SIZE as u32)
            || !memory::in_bounds(memory, data_offset, length)
        {
            self.frame_mut()?.return_data.clear();
            return resume_code(CallResult::Failure);
        }
        let value = memory::read_value(memory, value_offset)?;
        let code = memory::read_bytes(memory, data_offset, length)?;

        let from = self.frame()?.contract.address;
        if !self.chain.can_transfer(&*self.state, &from, value) {
            self.frame_mut()?.return_data.clear();
            return resume_code(CallResult::Failure);
        }

        let gas_left = self.frame()?.contract.gas;
        let forwarded = gas_left - gas_left / CREATE_GAS_RESERVE_DIVISOR;
        self.use_gas(forwarded)?;

        let caller = self.frame()?.contract.clone();
        let outcome = self.creator.create(&mut *self.state, &caller, code, forwarded, value);
        match outcome {
            Err(_) => {
                self.frame_mut()?.return_data.clear();
                resume_code(CallResult::Failure)
            }
            Ok(outcome) => match outcome.terminate {
                TerminateType::Finish => {
                    memory::write_address(memory, result_offset, &outcome.address)?;
                    let frame = self.frame_mut()?;
                    frame.contract.gas += outcome.gas_left;
                    frame.return_data.clear();
                    resume_code(CallResult::Success)
                }
                TerminateType::Revert => {
                    // the full forwarded amount comes back on a revert, not
                    // just the leftover
                    let frame = self.frame_mut()?;
                    frame.contract.gas += forwarded;
                    frame.return_data = outcome.output;
                    resume_code(CallResult::Revert)
                }
                _ => {
                    let frame = self.frame_mut()?;
                    frame.contract.gas += outcome.gas_left;
                    frame.return_data.clear();
                    resume_code(CallResult::Failure)
                }
            },
        }
    }

    /// The debug surface. Unmetered; only linked when the interpreter runs in
    /// debug mode.
    pub(crate) fn call_debug(
        &mut self,
        func: DebugFunc,
        memory: &mut Vec<u8>,
        args: &[Value],
    ) -> RunResult<HostOutcome> {
        match func {
            DebugFunc::PrintMem => {
                let data = memory::read_bytes(memory, arg_u32(args, 0)?, arg_u32(args, 1)?)?;
                log::debug!(target: "contract", "mem: {}", String::from_utf8_lossy(&data));
            }
            DebugFunc::PrintMemHex => {
                let data = memory::read_bytes(memory, arg_u32(args, 0)?, arg_u32(args, 1)?)?;
                log::debug!(target: "contract", "mem: 0x{}", hex(&data));
            }
            DebugFunc::PrintStorage => {
                let (address, value) = self.debug_storage_value(memory, args)?;
                log::debug!(
                    target: "contract",
                    "storage[{}]: {}",
                    address,
                    String::from_utf8_lossy(&value.0)
                );
            }
            DebugFunc::PrintStorageHex => {
                let (address, value) = self.debug_storage_value(memory, args)?;
                log::debug!(target: "contract", "storage[{}]: 0x{}", address, hex(&value.0));
            }
        }
        resume_none()
    }

    fn debug_storage_value(
        &mut self,
        memory: &[u8],
        args: &[Value],
    ) -> ExecResult<(Address, Word)> {
        let key = memory::read_word(memory, arg_u32(args, 0)?)?;
        let address = self.frame()?.contract.address;
        Ok((address, self.state.get_state(&address, &key)))
    }
}
