use std::fmt::{self, Debug, Formatter};
use std::os::raw::c_void;

use memory_pool::Memory;

/// A `Context` stores a suspended execution point, for it to be resumed later.
///
/// Resuming a `Context` freezes the caller and continues the target exactly
/// where it left off. The frozen caller shows up as the `context` of the
/// [`Transfer`] the target receives, which is the only place the resumption
/// point of the caller can be picked up from.
// Points into a coroutine stack. Only valid until that stack is recycled,
// which no lifetime can express.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Context(&'static c_void);

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Context({:p})", self.0)
    }
}

impl Context {
    /// Creates a new `Context` prepared to execute `f` at the top of `stack`.
    ///
    /// `f` is not executed until the first call to `resume()`.
    ///
    /// # Safety
    ///
    /// `stack` must stay mapped for as long as the returned `Context`, or any
    /// context captured on that stack, can still be resumed.
    #[inline(always)]
    pub(crate) unsafe fn new(stack: &Memory, f: ContextFn) -> Context {
        Context(ring_coroutine_make_fcontext(stack.top(), stack.len(), f))
    }

    /// Suspends the caller and continues `self`.
    ///
    /// The call only returns once someone resumes the caller in turn. The
    /// returned `Transfer` holds the context that did so and the `data` it passed.
    #[inline(always)]
    pub(crate) fn resume(self, data: *mut c_void) -> Transfer {
        unsafe { ring_coroutine_jump_fcontext(self.0, data) }
    }
}

/// What a coroutine receives when it is switched to.
///
/// The scheduler files `context` under the coroutine that switched away, which
/// is how a suspended coroutine can be resumed later.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    /// Resumption point of the side that switched away.
    pub context: Context,
    /// Word handed over by the switching side, the scheduler on a first start.
    pub data: *mut c_void,
}

impl Transfer {
    #[inline(always)]
    pub fn new(context: Context, data: *mut c_void) -> Transfer {
        Transfer { context, data }
    }
}

/// Functions of this signature are used as the entry point for a new `Context`.
///
/// They must never return: a finished entry hands control to another context.
pub type ContextFn = extern "C" fn(t: Transfer) -> !;

extern "C" {
    /// Lays out an initial frame at the 16 byte aligned top of a stack.
    ///
    /// # Arguments
    /// * `sp`   - A pointer to the top of the stack.
    /// * `size` - The size of the stack.
    /// * `f`    - A function to be invoked on the first jump to the returned context.
    fn ring_coroutine_make_fcontext(sp: *mut c_void, size: usize, f: ContextFn) -> &'static c_void;

    /// Saves the callee-saved registers of the caller on its own stack and
    /// restores those of `to`.
    ///
    /// # Arguments
    /// * `to`    - The context to continue.
    /// * `param` - Handed to `to` as the `data` field of the `Transfer` it receives.
    fn ring_coroutine_jump_fcontext(to: &'static c_void, param: *mut c_void) -> Transfer;
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", unix, not(target_vendor = "apple")))] {
        // System V AMD64: r12-r15, rbx, rbp plus the MXCSR and x87 control words.
        std::arch::global_asm!(
            ".text",
            ".globl ring_coroutine_make_fcontext",
            ".type ring_coroutine_make_fcontext,@function",
            ".p2align 4",
            "ring_coroutine_make_fcontext:",
            "    movq %rdi, %rax",
            "    andq $-16, %rax",
            // room for the context data, (rsp - 0x8) % 16 == 0 on entry of f
            "    leaq -0x40(%rax), %rax",
            // f is picked up from rbx by the trampoline
            "    movq %rdx, 0x28(%rax)",
            "    stmxcsr (%rax)",
            "    fnstcw 0x4(%rax)",
            "    leaq ring_coroutine_trampoline(%rip), %rcx",
            "    movq %rcx, 0x38(%rax)",
            // restored into rbp, pushed as the return address of f
            "    leaq ring_coroutine_finish(%rip), %rcx",
            "    movq %rcx, 0x30(%rax)",
            "    ret",
            "ring_coroutine_trampoline:",
            "    push %rbp",
            "    jmp *%rbx",
            "ring_coroutine_finish:",
            "    ud2",
            ".size ring_coroutine_make_fcontext,.-ring_coroutine_make_fcontext",
            "",
            ".globl ring_coroutine_jump_fcontext",
            ".type ring_coroutine_jump_fcontext,@function",
            ".p2align 4",
            "ring_coroutine_jump_fcontext:",
            "    leaq -0x38(%rsp), %rsp",
            "    stmxcsr (%rsp)",
            "    fnstcw 0x4(%rsp)",
            "    movq %r12, 0x8(%rsp)",
            "    movq %r13, 0x10(%rsp)",
            "    movq %r14, 0x18(%rsp)",
            "    movq %r15, 0x20(%rsp)",
            "    movq %rbx, 0x28(%rsp)",
            "    movq %rbp, 0x30(%rsp)",
            // the suspended context is the stack pointer itself
            "    movq %rsp, %rax",
            "    movq %rdi, %rsp",
            "    movq 0x38(%rsp), %r8",
            "    ldmxcsr (%rsp)",
            "    fldcw 0x4(%rsp)",
            "    movq 0x8(%rsp), %r12",
            "    movq 0x10(%rsp), %r13",
            "    movq 0x18(%rsp), %r14",
            "    movq 0x20(%rsp), %r15",
            "    movq 0x28(%rsp), %rbx",
            "    movq 0x30(%rsp), %rbp",
            "    leaq 0x40(%rsp), %rsp",
            // Transfer is returned in rax:rdx and passed to a fresh f in rdi:rsi
            "    movq %rsi, %rdx",
            "    movq %rax, %rdi",
            "    jmp *%r8",
            ".size ring_coroutine_jump_fcontext,.-ring_coroutine_jump_fcontext",
            options(att_syntax)
        );
    } else if #[cfg(all(target_arch = "aarch64", unix, not(target_vendor = "apple")))] {
        // AAPCS64: x19-x30 and d8-d15.
        std::arch::global_asm!(
            ".text",
            ".globl ring_coroutine_make_fcontext",
            ".type ring_coroutine_make_fcontext,%function",
            ".p2align 2",
            "ring_coroutine_make_fcontext:",
            "    and x0, x0, #0xfffffffffffffff0",
            "    sub x0, x0, #0xb0",
            // f is loaded as the pc of the first jump
            "    str x2, [x0, #0xa0]",
            // and returns into finish through lr
            "    adr x1, ring_coroutine_finish",
            "    str x1, [x0, #0x98]",
            "    ret x30",
            "ring_coroutine_finish:",
            "    brk #0x1",
            ".size ring_coroutine_make_fcontext,.-ring_coroutine_make_fcontext",
            "",
            ".globl ring_coroutine_jump_fcontext",
            ".type ring_coroutine_jump_fcontext,%function",
            ".p2align 2",
            "ring_coroutine_jump_fcontext:",
            "    sub sp, sp, #0xb0",
            "    stp d8, d9, [sp, #0x00]",
            "    stp d10, d11, [sp, #0x10]",
            "    stp d12, d13, [sp, #0x20]",
            "    stp d14, d15, [sp, #0x30]",
            "    stp x19, x20, [sp, #0x40]",
            "    stp x21, x22, [sp, #0x50]",
            "    stp x23, x24, [sp, #0x60]",
            "    stp x25, x26, [sp, #0x70]",
            "    stp x27, x28, [sp, #0x80]",
            "    stp x29, x30, [sp, #0x90]",
            "    str x30, [sp, #0xa0]",
            "    mov x4, sp",
            "    mov sp, x0",
            "    ldp d8, d9, [sp, #0x00]",
            "    ldp d10, d11, [sp, #0x10]",
            "    ldp d12, d13, [sp, #0x20]",
            "    ldp d14, d15, [sp, #0x30]",
            "    ldp x19, x20, [sp, #0x40]",
            "    ldp x21, x22, [sp, #0x50]",
            "    ldp x23, x24, [sp, #0x60]",
            "    ldp x25, x26, [sp, #0x70]",
            "    ldp x27, x28, [sp, #0x80]",
            "    ldp x29, x30, [sp, #0x90]",
            // Transfer is returned in x0:x1 and passed to a fresh f in x0:x1
            "    mov x0, x4",
            "    ldr x4, [sp, #0xa0]",
            "    add sp, sp, #0xb0",
            "    ret x4",
            ".size ring_coroutine_jump_fcontext,.-ring_coroutine_jump_fcontext",
        );
    } else {
        compile_error!("ring-coroutine supports x86_64 and aarch64 ELF targets only");
    }
}

#[cfg(test)]
mod tests {
    use std::os::raw::c_void;
    use std::ptr;

    use memory_pool::Memory;

    use crate::context::{Context, Transfer};

    // This method will always `resume()` immediately back to the
    // previous `Context` with a `data` value of the next number in the fibonacci sequence.
    extern "C" fn fibonacci(mut t: Transfer) -> ! {
        let mut a = 0usize;
        let mut b = 1usize;
        loop {
            t = t.context.resume(a as *mut c_void);
            let next = a + b;
            a = b;
            b = next;
        }
    }

    #[test]
    fn generator() {
        let stack = Memory::new(memory_pool::default_size()).unwrap();
        let mut t = Transfer::new(unsafe { Context::new(&stack, fibonacci) }, ptr::null_mut());
        let mut seen = Vec::new();
        for _ in 0..10 {
            t = t.context.resume(ptr::null_mut());
            seen.push(t.data as usize);
        }
        assert_eq!(vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34], seen);
        stack.release();
    }

    // Doubles whatever it is handed, forever.
    extern "C" fn doubler(mut t: Transfer) -> ! {
        loop {
            let value = unsafe { *(t.data as *const f64) };
            let doubled = value * 2.0;
            t = t.context.resume(&doubled as *const f64 as *mut c_void);
        }
    }

    #[test]
    fn data_round_trip() {
        let stack = Memory::new(memory_pool::default_size()).unwrap();
        let mut context = unsafe { Context::new(&stack, doubler) };
        for i in 0..5 {
            let value = i as f64 + 0.5;
            let t = context.resume(&value as *const f64 as *mut c_void);
            context = t.context;
            assert_eq!(value * 2.0, unsafe { *(t.data as *const f64) });
        }
        stack.release();
    }
}
