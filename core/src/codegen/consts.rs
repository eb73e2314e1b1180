//! file: core/src/codegen/consts.rs
//! description: interned strings, the symbol table and hoisted constants.
//!
//! A constant is materialized on first reference: its initializer is
//! generated into a fresh block of the entry function, appended to the
//! `const` chain that runs before user code. Later references only load
//! the cached global.

use super::context::Activation;
use super::layout::string_type;
use super::CodeGen;
use crate::error::{CodegenError, Result};
use crate::ir::{CastOp, Constant, Global, GlobalId, IrType, Linkage, Value};
use crate::program::{ConstId, Node, TypeId};

impl<'p> CodeGen<'p> {
    /// `[len + 5 x i8]`: little-endian `i32` length, the bytes, a NUL.
    pub(super) fn string_global(&mut self, s: &str) -> GlobalId {
        if let Some(g) = self.strings.get(s) {
            return *g;
        }
        let mut bytes = (s.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        let init = Constant::bytes(&bytes);
        let global = Global {
            name: self.b.module.unique_global_name("str"),
            ty: init.ty(),
            init: Some(init),
            constant: true,
            linkage: Linkage::Private,
        };
        let g = self.b.module.add_global(global);
        self.strings.insert(s.to_string(), g);
        g
    }

    pub(super) fn string_literal(&mut self, s: &str) -> Value {
        let global = self.string_global(s);
        Value::Const(Constant::GlobalAddr { global, ty: string_type() })
    }

    /// Symbols are numbered in sorted order, so the numbering only depends
    /// on the set of symbols in the program.
    pub(super) fn build_symbol_table(&mut self) {
        let symbols = self.program.symbol_set();
        if symbols.is_empty() {
            return;
        }
        let mut entries = Vec::with_capacity(symbols.len());
        for (index, name) in symbols.iter().enumerate() {
            self.symbols.insert(name.clone(), index as i64);
            let global = self.string_global(name);
            entries.push(Constant::GlobalAddr { global, ty: string_type() });
        }
        let init = Constant::Array { elem: string_type(), values: entries };
        let global = Global {
            name: self.b.module.unique_global_name("symbol_table"),
            ty: init.ty(),
            init: Some(init),
            constant: true,
            linkage: Linkage::Internal,
        };
        self.symbol_table = Some(self.b.module.add_global(global));
        log::debug!("symbol table with {} entrie(s)", symbols.len());
    }

    pub(super) fn symbol_literal(&mut self, name: &str) -> Result<Value> {
        self.symbols
            .get(name)
            .map(|index| Value::i32(*index))
            .ok_or_else(|| CodegenError::internal(format!("symbol :{} missing from the symbol table", name), None))
    }

    /// Name of the symbol numbered `index`.
    pub(super) fn symbol_name(&mut self, index: Value) -> Result<Value> {
        let table = self
            .symbol_table
            .ok_or_else(|| CodegenError::internal("program has no symbols", None))?;
        let index = self.b.cast(CastOp::SExt, index, IrType::i64());
        let slot = self.b.gep(Value::Global(table), vec![Value::i32(0), index]);
        Ok(self.b.load(slot, Some("symbol_name")))
    }

    pub(super) fn visit_const(&mut self, id: ConstId) -> Result<Value> {
        let program = self.program;
        let def = program.constant(id);
        let ty = def.value.ty.unwrap_or(self.nil);
        let global = match self.consts.get(&id) {
            Some(g) => *g,
            None => {
                let ir = self.llvm(ty);
                let global = Global {
                    name: self.b.module.unique_global_name(&def.name),
                    ty: ir.clone(),
                    init: Some(Constant::Null(ir)),
                    constant: false,
                    linkage: Linkage::Internal,
                };
                let g = self.b.module.add_global(global);
                // Cached before the initializer runs: a reference from inside
                // it reads the zeroed slot instead of recursing.
                self.consts.insert(id, g);
                self.initialize_const(g, &def.name, &def.value, ty)?;
                g
            }
        };
        if self.types.is_address_held(ty) {
            Ok(Value::Global(global))
        } else {
            Ok(self.b.load(Value::Global(global), Some(def.name.as_str())))
        }
    }

    fn initialize_const(
        &mut self,
        global: GlobalId,
        name: &str,
        value: &'p Node,
        ty: TypeId,
    ) -> Result<()> {
        log::debug!("hoisting initializer of constant {}", name);
        let saved_position = self.b.position();
        let saved_fun = std::mem::replace(&mut self.fun, self.main.clone());
        let saved_blocks = std::mem::take(&mut self.blocks);

        let main = self.main.func;
        let block = self.b.append_block(main, &format!("const_{}", name));
        self.b.position_at_end(main, block);
        let result = self.with_activation(Activation::new(self.types.program()), |cg| {
            let v = cg.accept(value)?;
            let vty = cg.ty_of(value);
            match &v {
                Value::Const(c) if vty == ty && c.ty() == cg.llvm(ty) && !matches!(c, Constant::Undef(_)) => {
                    let g = cg.b.module.global_mut(global);
                    g.init = Some(c.clone());
                    g.constant = true;
                }
                _ => cg.assign(Value::Global(global), ty, vty, v.clone())?,
            }
            cg.current_block()
        });

        if let Ok(tail) = &result {
            let tail = *tail;
            self.b.position_at_end(main, self.const_tail);
            self.b.br(block);
            self.const_tail = tail;
        }
        self.blocks = saved_blocks;
        self.fun = saved_fun;
        if let Some((f, b)) = saved_position {
            self.b.position_at_end(f, b);
        }
        result.map(|_| ())
    }
}
