use pretty_assertions::assert_eq;
use smallvec::smallvec;

use super::*;

fn ty(n: u32) -> TypeId {
    TypeId::new(n)
}

#[test]
fn values_are_numbered_in_definition_order() {
    let mut body = FunctionBody::new();
    let entry = body.add_block();
    let arg = body.add_block_arg(entry, ty(0));
    let boxed = body.push_inst(entry, InstKind::AllocBox { ty: ty(1) });
    let ret = body.push_inst(entry, InstKind::Return { operand: arg });

    assert_eq!(arg, ValueId::new(0));
    assert_eq!(boxed.to_vec(), vec![ValueId::new(1), ValueId::new(2)]);
    assert!(ret.is_empty());
    assert_eq!(
        body.value(boxed[1]).def,
        ValueDef::Result {
            block: entry,
            inst: 0,
            index: 1
        }
    );
    assert!(body.block(entry).terminator().is_some());
}

#[test]
fn placeholders_are_replaced_in_every_use() {
    let mut body = FunctionBody::new();
    let entry = body.add_block();
    let exit = body.add_block();
    let placeholder = body.add_placeholder(Some(ty(0)));
    body.push_inst(
        entry,
        InstKind::Branch {
            dest: exit,
            args: smallvec![placeholder],
        },
    );
    let real = body.add_block_arg(exit, ty(0));
    body.push_inst(exit, InstKind::Return { operand: placeholder });

    assert!(body.has_uses(placeholder));
    body.replace_all_uses(placeholder, real);
    assert!(!body.has_uses(placeholder));
    assert_eq!(body.block(exit).insts[0].kind.operands(), vec![real]);
}

#[test]
fn removing_blocks_renumbers_successors_and_discards_values() {
    let mut body = FunctionBody::new();
    let entry = body.add_block();
    let junk = body.add_block();
    let exit = body.add_block();
    let junk_value = body.add_block_arg(junk, ty(0));
    let exit_arg = body.add_block_arg(exit, ty(0));
    body.push_inst(
        entry,
        InstKind::Branch {
            dest: exit,
            args: smallvec![],
        },
    );
    body.push_inst(exit, InstKind::Return { operand: exit_arg });

    body.remove_blocks(&[junk]);

    assert_eq!(body.blocks.len(), 2);
    assert_eq!(
        body.block(entry).insts[0].kind.successors().to_vec(),
        vec![BlockId::new(1)]
    );
    assert_eq!(body.value(junk_value).def, ValueDef::Discarded);
    assert_eq!(
        body.value(exit_arg).def,
        ValueDef::BlockArg {
            block: BlockId::new(1),
            index: 0
        }
    );
}

#[test]
fn linkage_round_trips_through_raw() {
    for raw in 0..=5u8 {
        let linkage = Linkage::from_raw(raw).unwrap_or_else(|| panic!("linkage {raw}"));
        assert_eq!(linkage as u8, raw);
    }
    assert_eq!(Linkage::from_raw(6), None);
    assert!(Linkage::PublicExternal.is_external());
}
