//! Coroutine 核心单元测试
//!
//! 覆盖生命周期状态机、注册表、栈策略与钩子
